//! Step progress state machine
//!
//! ```text
//! locked ──unlock──▶ unlocked ──start──▶ in_progress ──submit──▶ submitted
//!                                                                  │    │
//!                                      ┌──────────approve──────────┘    reject
//!                                      ▼                                 ▼
//!                                   approved                         rejected
//!                                                                       │
//!                                        submitted ◀──────submit────────┘
//! ```
//!
//! `approved` is terminal for a step. A rejected step goes straight back to
//! `submitted` on resubmission; it never re-enters `in_progress`.
//!
//! The functions here are pure. The repository layer uses
//! [`StepEvent::source_states`] to build conditional updates so that a
//! transition only applies to rows still in a legal source state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::RoadmapError;

/// Status of one student's progress on one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StepStatus {
    Locked,
    Unlocked,
    InProgress,
    Submitted,
    Approved,
    Rejected,
}

impl StepStatus {
    pub const ALL: [StepStatus; 6] = [
        StepStatus::Locked,
        StepStatus::Unlocked,
        StepStatus::InProgress,
        StepStatus::Submitted,
        StepStatus::Approved,
        StepStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Locked => "locked",
            StepStatus::Unlocked => "unlocked",
            StepStatus::InProgress => "in_progress",
            StepStatus::Submitted => "submitted",
            StepStatus::Approved => "approved",
            StepStatus::Rejected => "rejected",
        }
    }

    /// Approved steps count towards aggregate completion
    pub fn is_completed(&self) -> bool {
        matches!(self, StepStatus::Approved)
    }

    /// Status a freshly started roadmap gives the step at `index` (0-based)
    pub fn initial(index: usize) -> Self {
        if index == 0 {
            StepStatus::Unlocked
        } else {
            StepStatus::Locked
        }
    }
}

impl FromStr for StepStatus {
    type Err = RoadmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locked" => Ok(StepStatus::Locked),
            "unlocked" => Ok(StepStatus::Unlocked),
            "in_progress" => Ok(StepStatus::InProgress),
            "submitted" => Ok(StepStatus::Submitted),
            // legacy rows wrote "completed" for approved steps
            "approved" | "completed" => Ok(StepStatus::Approved),
            "rejected" => Ok(StepStatus::Rejected),
            other => Err(RoadmapError::Internal(format!(
                "Unknown step status in storage: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive a step between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    /// Predecessor approved (or first step on roadmap start)
    Unlock,
    /// Student begins working on the step
    Start,
    /// Student submits evidence
    Submit,
    /// Teacher approves the submission
    Approve,
    /// Teacher rejects the submission
    Reject,
}

impl StepEvent {
    /// States from which this event is legal
    pub fn source_states(&self) -> &'static [StepStatus] {
        match self {
            StepEvent::Unlock => &[StepStatus::Locked],
            StepEvent::Start => &[StepStatus::Unlocked],
            StepEvent::Submit => &[StepStatus::InProgress, StepStatus::Rejected],
            StepEvent::Approve | StepEvent::Reject => &[StepStatus::Submitted],
        }
    }

    /// Target state of this event
    pub fn target(&self) -> StepStatus {
        match self {
            StepEvent::Unlock => StepStatus::Unlocked,
            StepEvent::Start => StepStatus::InProgress,
            StepEvent::Submit => StepStatus::Submitted,
            StepEvent::Approve => StepStatus::Approved,
            StepEvent::Reject => StepStatus::Rejected,
        }
    }

    pub fn source_strs(&self) -> Vec<&'static str> {
        self.source_states().iter().map(|s| s.as_str()).collect()
    }
}

/// Apply `event` to a step currently in `from`
///
/// Returns the new status, or the error a caller should see when the step is
/// not in a state that accepts the event.
pub fn transition(from: StepStatus, event: StepEvent) -> Result<StepStatus, RoadmapError> {
    if event.source_states().contains(&from) {
        return Ok(event.target());
    }

    Err(rejection(from, event))
}

/// Error for an illegal (state, event) pair
pub fn rejection(from: StepStatus, event: StepEvent) -> RoadmapError {
    use StepStatus::*;

    match (event, from) {
        (StepEvent::Submit, Submitted) => {
            RoadmapError::Conflict("evidence already submitted and pending review".into())
        }
        (StepEvent::Submit, Approved) => RoadmapError::Conflict("step already approved".into()),
        (StepEvent::Submit, _) => RoadmapError::PreconditionFailed(format!(
            "step must be started before submitting evidence (current status: {})",
            from
        )),
        (StepEvent::Approve | StepEvent::Reject, Approved | Rejected) => {
            RoadmapError::Conflict(format!("submission already reviewed ({})", from))
        }
        (StepEvent::Approve | StepEvent::Reject, _) => RoadmapError::PreconditionFailed(format!(
            "step has no pending submission (current status: {})",
            from
        )),
        (StepEvent::Start, Locked) => RoadmapError::PreconditionFailed(
            "step is locked until the previous step is approved".into(),
        ),
        (StepEvent::Start, _) => RoadmapError::PreconditionFailed(format!(
            "step cannot be started (current status: {})",
            from
        )),
        (StepEvent::Unlock, _) => RoadmapError::PreconditionFailed(format!(
            "step cannot be unlocked (current status: {})",
            from
        )),
    }
}

/// Percentage of approved steps, rounded to two decimals; 0 for empty roadmaps
pub fn progress_percent(completed: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round_percent(completed as f64 / total as f64 * 100.0)
}

/// Round a percentage to two decimals
pub fn round_percent(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// UI hints derived purely from a step's current status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StepHints {
    pub can_start: bool,
    pub can_submit: bool,
    pub is_locked: bool,
}

impl From<StepStatus> for StepHints {
    fn from(status: StepStatus) -> Self {
        Self {
            can_start: status == StepStatus::Unlocked,
            can_submit: StepEvent::Submit.source_states().contains(&status),
            is_locked: status == StepStatus::Locked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let s = transition(StepStatus::Locked, StepEvent::Unlock).unwrap();
        let s = transition(s, StepEvent::Start).unwrap();
        assert_eq!(s, StepStatus::InProgress);
        let s = transition(s, StepEvent::Submit).unwrap();
        assert_eq!(s, StepStatus::Submitted);
        let s = transition(s, StepEvent::Approve).unwrap();
        assert_eq!(s, StepStatus::Approved);
    }

    #[test]
    fn test_resubmission_skips_in_progress() {
        let s = transition(StepStatus::Submitted, StepEvent::Reject).unwrap();
        assert_eq!(s, StepStatus::Rejected);
        assert_eq!(
            transition(s, StepEvent::Submit).unwrap(),
            StepStatus::Submitted
        );
        assert!(matches!(
            transition(s, StepEvent::Start),
            Err(RoadmapError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn test_submit_before_start_is_precondition_failure() {
        for from in [StepStatus::Locked, StepStatus::Unlocked] {
            assert!(matches!(
                transition(from, StepEvent::Submit),
                Err(RoadmapError::PreconditionFailed(_))
            ));
        }
    }

    #[test]
    fn test_double_submit_and_double_review_conflict() {
        assert!(matches!(
            transition(StepStatus::Submitted, StepEvent::Submit),
            Err(RoadmapError::Conflict(_))
        ));
        assert!(matches!(
            transition(StepStatus::Approved, StepEvent::Approve),
            Err(RoadmapError::Conflict(_))
        ));
        assert!(matches!(
            transition(StepStatus::Rejected, StepEvent::Reject),
            Err(RoadmapError::Conflict(_))
        ));
    }

    #[test]
    fn test_start_requires_unlocked() {
        assert!(matches!(
            transition(StepStatus::Locked, StepEvent::Start),
            Err(RoadmapError::PreconditionFailed(_))
        ));
        assert!(transition(StepStatus::InProgress, StepEvent::Start).is_err());
    }

    #[test]
    fn test_status_round_trip_and_legacy_alias() {
        for status in StepStatus::ALL {
            assert_eq!(status.as_str().parse::<StepStatus>().unwrap(), status);
        }
        assert_eq!("completed".parse::<StepStatus>().unwrap(), StepStatus::Approved);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0.0);
        assert_eq!(progress_percent(0, 3), 0.0);
        assert_eq!(progress_percent(1, 3), 33.33);
        assert_eq!(progress_percent(2, 3), 66.67);
        assert_eq!(progress_percent(3, 3), 100.0);
    }

    #[test]
    fn test_hints() {
        let hints = StepHints::from(StepStatus::Locked);
        assert!(hints.is_locked && !hints.can_start && !hints.can_submit);
        assert!(StepHints::from(StepStatus::Unlocked).can_start);
        assert!(StepHints::from(StepStatus::InProgress).can_submit);
        assert!(StepHints::from(StepStatus::Rejected).can_submit);
        assert!(!StepHints::from(StepStatus::Submitted).can_submit);
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(StepStatus::initial(0), StepStatus::Unlocked);
        assert_eq!(StepStatus::initial(1), StepStatus::Locked);
    }
}
