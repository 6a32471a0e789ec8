//! Progress service - student operations and read views
//!
//! Profile lookups go through the [`Directory`] before any database closure
//! runs; a closure must never call back into the pool.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;
use url::Url;

use crate::caller::{Caller, Role};
use crate::db::models::{
    evidence_types, roadmap_status, Roadmap, RoadmapStep, StudentProfile, StudentRoadmapProgress,
    StudentStepProgress, TargetRole,
};
use crate::db::progress::{self, Evidence, StartedRoadmap};
use crate::db::roadmaps::{self, RoadmapQuery};
use crate::db::RoadmapDb;
use crate::error::RoadmapError;
use crate::pagination::{PageRequest, Paginated};
use crate::progression::{self, StepHints};

use super::directory::{unique_ids, Directory};
use super::events::{EventBus, RoadmapEvent};

const MAX_LINK_LEN: usize = 2048;
const MAX_SUBMISSION_NOTES_LEN: usize = 2000;

// ============================================================================
// Input / View Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitEvidenceInput {
    pub evidence_link: String,
    #[serde(default)]
    pub evidence_type: Option<String>,
    #[serde(default)]
    pub submission_notes: Option<String>,
}

/// Active roadmap as offered to a student
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AvailableRoadmap {
    #[serde(flatten)]
    pub roadmap: Roadmap,
    pub target_role: Option<TargetRole>,
    pub step_count: i64,
    pub is_recommended: bool,
    pub started: bool,
    pub progress_id: Option<String>,
    pub progress_percent: Option<f64>,
}

/// One step of a roadmap with the student's state on it
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StepProgressView {
    pub step: RoadmapStep,
    pub progress: StudentStepProgress,
    #[serde(flatten)]
    pub hints: StepHints,
}

/// Full step-by-step view of one started roadmap
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoadmapProgressView {
    pub roadmap: Roadmap,
    pub target_role: Option<TargetRole>,
    pub progress: StudentRoadmapProgress,
    pub steps: Vec<StepProgressView>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoadmapProgressSummary {
    #[serde(flatten)]
    pub progress: StudentRoadmapProgress,
    pub roadmap_name: String,
    pub target_role_id: String,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProgressStats {
    pub roadmaps_started: i64,
    pub roadmaps_completed: i64,
    pub steps_completed: i64,
    /// Completed roadmaps over started roadmaps, in percent
    pub completion_rate: f64,
}

/// Cross-roadmap summary for one student
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MyProgress {
    pub active: Vec<RoadmapProgressSummary>,
    pub completed: Vec<RoadmapProgressSummary>,
    pub stats: ProgressStats,
}

// ============================================================================
// Service
// ============================================================================

pub struct ProgressService {
    db: Arc<RoadmapDb>,
    directory: Arc<dyn Directory>,
    events: Arc<EventBus>,
}

impl ProgressService {
    pub fn new(db: Arc<RoadmapDb>, directory: Arc<dyn Directory>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            directory,
            events,
        }
    }

    fn student(&self, caller: &Caller) -> Result<StudentProfile, RoadmapError> {
        caller.require(&[Role::Student])?;
        self.directory.student_for_user(&caller.user_id)
    }

    // =========================================================================
    // Read Views
    // =========================================================================

    /// Active roadmaps, optionally narrowed to the student's recommended role
    ///
    /// A student without a recommendation gets the unfiltered list.
    pub fn available_roadmaps(
        &self,
        caller: &Caller,
        page: PageRequest,
        recommended_only: bool,
    ) -> Result<Paginated<AvailableRoadmap>, RoadmapError> {
        let student = self.student(caller)?;
        let recommended = student.recommended_role_id.clone();

        let query = RoadmapQuery {
            status: Some(roadmap_status::ACTIVE.to_string()),
            target_role_id: if recommended_only {
                recommended.clone()
            } else {
                None
            },
        };

        let (rows, total, counts, started) = self.db.with_conn(|conn| {
            let rows = roadmaps::list_roadmaps(conn, &query, page.limit, page.offset())?;
            let total = roadmaps::count_roadmaps(conn, &query)?;
            let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let mut counts = HashMap::new();
            for id in &ids {
                counts.insert(id.clone(), roadmaps::step_count(conn, id)?);
            }
            let started = progress::aggregates_for_student_in(conn, &student.id, &ids)?;
            Ok((rows, total, counts, started))
        })?;

        let roles = self
            .directory
            .target_roles(&unique_ids(rows.iter().map(|r| &r.target_role_id)))?;
        let started: HashMap<String, StudentRoadmapProgress> = started
            .into_iter()
            .map(|a| (a.roadmap_id.clone(), a))
            .collect();

        let items = rows
            .into_iter()
            .map(|roadmap| {
                let aggregate = started.get(&roadmap.id);
                AvailableRoadmap {
                    target_role: roles.get(&roadmap.target_role_id).cloned(),
                    step_count: counts.get(&roadmap.id).copied().unwrap_or(0),
                    is_recommended: recommended.as_deref() == Some(roadmap.target_role_id.as_str()),
                    started: aggregate.is_some(),
                    progress_id: aggregate.map(|a| a.id.clone()),
                    progress_percent: aggregate.map(|a| a.progress_percent),
                    roadmap,
                }
            })
            .collect();

        Ok(Paginated::new(items, total, page))
    }

    /// Step-by-step view of one roadmap the student has started
    pub fn roadmap_progress(
        &self,
        caller: &Caller,
        roadmap_id: &str,
    ) -> Result<RoadmapProgressView, RoadmapError> {
        let student = self.student(caller)?;

        let (roadmap, aggregate, catalog, rows) = self.db.with_conn(|conn| {
            let roadmap = roadmaps::require_roadmap(conn, roadmap_id)?;
            let aggregate = progress::find_aggregate(conn, roadmap_id, &student.id)?
                .ok_or_else(|| {
                    RoadmapError::NotFound(format!("roadmap {} has not been started", roadmap_id))
                })?;
            let catalog = roadmaps::get_steps(conn, roadmap_id)?;
            let rows = progress::step_progress_for_aggregate(conn, &aggregate.id)?;
            Ok((roadmap, aggregate, catalog, rows))
        })?;

        let mut by_step: HashMap<String, StudentStepProgress> = rows
            .into_iter()
            .map(|r| (r.roadmap_step_id.clone(), r))
            .collect();

        let mut steps = Vec::with_capacity(catalog.len());
        for step in catalog {
            // Steps added after the student started have no row
            if let Some(row) = by_step.remove(&step.id) {
                let hints = StepHints::from(row.step_status()?);
                steps.push(StepProgressView {
                    step,
                    progress: row,
                    hints,
                });
            }
        }

        Ok(RoadmapProgressView {
            target_role: self.directory.target_role(&roadmap.target_role_id)?,
            roadmap,
            progress: aggregate,
            steps,
        })
    }

    /// Active vs completed roadmaps plus totals
    pub fn my_progress(&self, caller: &Caller) -> Result<MyProgress, RoadmapError> {
        let student = self.student(caller)?;

        let (aggregates, names) = self.db.with_conn(|conn| {
            let aggregates = progress::aggregates_for_student(conn, &student.id)?;
            let ids = unique_ids(aggregates.iter().map(|a| &a.roadmap_id));
            let names: HashMap<String, Roadmap> = roadmaps::get_roadmaps_by_ids(conn, &ids)?
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect();
            Ok((aggregates, names))
        })?;

        let mut stats = ProgressStats::default();
        let mut active = Vec::new();
        let mut completed = Vec::new();

        for aggregate in aggregates {
            stats.roadmaps_started += 1;
            stats.steps_completed += aggregate.completed_steps as i64;

            let (roadmap_name, target_role_id) = match names.get(&aggregate.roadmap_id) {
                Some(r) => (r.name.clone(), r.target_role_id.clone()),
                None => (String::new(), String::new()),
            };
            let done = aggregate.is_completed();
            let summary = RoadmapProgressSummary {
                progress: aggregate,
                roadmap_name,
                target_role_id,
            };
            if done {
                stats.roadmaps_completed += 1;
                completed.push(summary);
            } else {
                active.push(summary);
            }
        }

        if stats.roadmaps_started > 0 {
            stats.completion_rate = progression::round_percent(
                stats.roadmaps_completed as f64 / stats.roadmaps_started as f64 * 100.0,
            );
        }

        Ok(MyProgress {
            active,
            completed,
            stats,
        })
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Enrol the student: aggregate plus one step row per catalog step
    pub fn start_roadmap(
        &self,
        caller: &Caller,
        roadmap_id: &str,
    ) -> Result<StartedRoadmap, RoadmapError> {
        let student = self.student(caller)?;

        let started = self
            .db
            .with_conn(|conn| progress::start_roadmap(conn, roadmap_id, &student.id))?;

        self.events.emit(RoadmapEvent::RoadmapStarted {
            progress_id: started.aggregate.id.clone(),
            roadmap_id: roadmap_id.to_string(),
            student_profile_id: student.id,
        });

        Ok(started)
    }

    /// `unlocked -> in_progress`
    pub fn start_step(
        &self,
        caller: &Caller,
        step_progress_id: &str,
    ) -> Result<StudentStepProgress, RoadmapError> {
        let student = self.student(caller)?;
        let step = self
            .db
            .with_conn(|conn| progress::start_step(conn, step_progress_id, &student.id))?;

        debug!(step_progress = %step.id, "Step started");
        self.events.emit(RoadmapEvent::StepStarted {
            step_progress_id: step.id.clone(),
        });
        Ok(step)
    }

    /// `in_progress | rejected -> submitted`
    pub fn submit_evidence(
        &self,
        caller: &Caller,
        step_progress_id: &str,
        input: SubmitEvidenceInput,
    ) -> Result<StudentStepProgress, RoadmapError> {
        let student = self.student(caller)?;
        let kind = validate_evidence(&input)?;

        let evidence = Evidence {
            link: input.evidence_link.trim(),
            kind,
            notes: input.submission_notes.as_deref(),
        };
        let step = self.db.with_conn(|conn| {
            progress::submit_evidence(conn, step_progress_id, &student.id, evidence)
        })?;

        info!(step_progress = %step.id, "Evidence submitted");
        self.events.emit(RoadmapEvent::EvidenceSubmitted {
            step_progress_id: step.id.clone(),
            evidence_link: evidence.link.to_string(),
        });
        Ok(step)
    }
}

/// Check the evidence link and type, returning the evidence type to store
fn validate_evidence(input: &SubmitEvidenceInput) -> Result<&'static str, RoadmapError> {
    let link = input.evidence_link.trim();
    if link.is_empty() {
        return Err(RoadmapError::InvalidInput("evidenceLink is required".into()));
    }
    if link.len() > MAX_LINK_LEN {
        return Err(RoadmapError::InvalidInput(format!(
            "evidenceLink must be <= {} characters",
            MAX_LINK_LEN
        )));
    }
    let parsed = Url::parse(link)
        .map_err(|e| RoadmapError::InvalidInput(format!("evidenceLink is not a valid URL: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RoadmapError::InvalidInput(
            "evidenceLink must be an http(s) URL with a host".into(),
        ));
    }

    let kind = match input.evidence_type.as_deref() {
        None => evidence_types::URL,
        Some(kind) if evidence_types::is_valid(kind) => evidence_types::URL,
        Some(other) => {
            return Err(RoadmapError::InvalidInput(format!(
                "evidenceType '{}' is not valid. Valid values: {:?}",
                other,
                evidence_types::ALL
            )))
        }
    };

    if let Some(ref notes) = input.submission_notes {
        if notes.chars().count() > MAX_SUBMISSION_NOTES_LEN {
            return Err(RoadmapError::InvalidInput(format!(
                "submissionNotes must be <= {} characters",
                MAX_SUBMISSION_NOTES_LEN
            )));
        }
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(link: &str, kind: Option<&str>) -> SubmitEvidenceInput {
        SubmitEvidenceInput {
            evidence_link: link.into(),
            evidence_type: kind.map(String::from),
            submission_notes: None,
        }
    }

    #[test]
    fn test_evidence_validation() {
        assert_eq!(
            validate_evidence(&input("https://github.com/x/y", None)).unwrap(),
            "url"
        );
        assert!(validate_evidence(&input("http://example.com/demo", Some("url"))).is_ok());

        for bad in ["", "   ", "not a url", "ftp://example.com/file", "mailto:me@example.com"] {
            assert!(
                matches!(
                    validate_evidence(&input(bad, None)),
                    Err(RoadmapError::InvalidInput(_))
                ),
                "accepted {:?}",
                bad
            );
        }

        assert!(matches!(
            validate_evidence(&input("https://github.com/x/y", Some("file"))),
            Err(RoadmapError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_submission_notes_limit() {
        let mut long = input("https://github.com/x/y", None);
        long.submission_notes = Some("x".repeat(MAX_SUBMISSION_NOTES_LEN + 1));
        assert!(matches!(
            validate_evidence(&long),
            Err(RoadmapError::InvalidInput(_))
        ));
    }
}
