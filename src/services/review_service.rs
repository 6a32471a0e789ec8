//! Review service - teacher review workflow and admin dashboards
//!
//! With strict review scoping a teacher only sees and reviews submissions of
//! roadmaps they are assigned to. Without it any teacher may review any
//! submission and `mine` narrows the pending list to assigned roadmaps.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use ts_rs::TS;

use crate::caller::{Caller, Role};
use crate::db::models::{Roadmap, RoadmapStep, StudentRoadmapProgress, StudentStepProgress};
use crate::db::progress::{self, ProgressCounters, ReviewAction, ReviewDecision, ReviewOutcome};
use crate::db::{directory as directory_repo, roadmaps, RoadmapDb};
use crate::error::RoadmapError;
use crate::pagination::{PageRequest, Paginated};

use super::directory::{unique_ids, Directory};
use super::events::{EventBus, RoadmapEvent};

pub const MAX_VALIDATION_NOTES_LEN: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewInput {
    pub action: ReviewAction,
    #[serde(default)]
    pub validation_score: Option<i32>,
    #[serde(default)]
    pub validation_notes: Option<String>,
}

/// Person reference in review and dashboard lists
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ProfileRef {
    pub id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Submitted step with the context a reviewer needs
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PendingSubmission {
    #[serde(flatten)]
    pub submission: StudentStepProgress,
    pub student: ProfileRef,
    pub roadmap_id: String,
    pub roadmap_name: String,
    pub step_title: String,
    pub step_order: i32,
}

/// One student's enrolment in a roadmap
#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct EnrolmentView {
    #[serde(flatten)]
    pub progress: StudentRoadmapProgress,
    pub student: ProfileRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_roadmaps: i64,
    pub roadmaps_by_status: BTreeMap<String, i64>,
    #[serde(flatten)]
    pub progress: ProgressCounters,
}

pub struct ReviewService {
    db: Arc<RoadmapDb>,
    directory: Arc<dyn Directory>,
    events: Arc<EventBus>,
    strict_review_scoping: bool,
}

impl ReviewService {
    pub fn new(
        db: Arc<RoadmapDb>,
        directory: Arc<dyn Directory>,
        events: Arc<EventBus>,
        strict_review_scoping: bool,
    ) -> Self {
        Self {
            db,
            directory,
            events,
            strict_review_scoping,
        }
    }

    // =========================================================================
    // Review Workflow
    // =========================================================================

    /// Submissions awaiting review, oldest first
    ///
    /// Admins see everything. Teachers are scoped to their assigned roadmaps
    /// when scoping is strict or when they ask for `mine`.
    pub fn pending(
        &self,
        caller: &Caller,
        page: PageRequest,
        mine: bool,
    ) -> Result<Paginated<PendingSubmission>, RoadmapError> {
        caller.require(&[Role::Teacher, Role::Admin])?;

        let teacher_id = match caller.role {
            Role::Teacher if self.strict_review_scoping || mine => {
                Some(self.directory.teacher_for_user(&caller.user_id)?.id)
            }
            _ => None,
        };

        let (rows, total, aggregates, roadmap_rows, steps) = self.db.with_conn(|conn| {
            let scope = match teacher_id {
                Some(ref id) => Some(directory_repo::reviewer_roadmap_ids(conn, id)?),
                None => None,
            };
            let rows = progress::list_pending(conn, scope.as_deref(), page.limit, page.offset())?;
            let total = progress::count_pending(conn, scope.as_deref())?;

            let aggregates = progress::get_aggregates_by_ids(
                conn,
                &unique_ids(rows.iter().map(|r| &r.student_roadmap_progress_id)),
            )?;
            let roadmap_rows = roadmaps::get_roadmaps_by_ids(
                conn,
                &unique_ids(aggregates.iter().map(|a| &a.roadmap_id)),
            )?;
            let steps = roadmaps::get_steps_by_ids(
                conn,
                &unique_ids(rows.iter().map(|r| &r.roadmap_step_id)),
            )?;
            Ok((rows, total, aggregates, roadmap_rows, steps))
        })?;

        let students = self
            .directory
            .students(&unique_ids(aggregates.iter().map(|a| &a.student_profile_id)))?;
        let aggregates: HashMap<String, StudentRoadmapProgress> = aggregates
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        let roadmap_rows: HashMap<String, Roadmap> = roadmap_rows
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let steps: HashMap<String, RoadmapStep> =
            steps.into_iter().map(|s| (s.id.clone(), s)).collect();

        let items = rows
            .into_iter()
            .map(|submission| {
                let aggregate = aggregates.get(&submission.student_roadmap_progress_id);
                let student_id = aggregate
                    .map(|a| a.student_profile_id.clone())
                    .unwrap_or_default();
                let roadmap_id = aggregate.map(|a| a.roadmap_id.clone()).unwrap_or_default();
                let roadmap_name = roadmap_rows
                    .get(&roadmap_id)
                    .map(|r| r.name.clone())
                    .unwrap_or_default();
                let (step_title, step_order) = steps
                    .get(&submission.roadmap_step_id)
                    .map(|s| (s.title.clone(), s.step_order))
                    .unwrap_or_default();
                let profile = students.get(&student_id);

                PendingSubmission {
                    student: ProfileRef {
                        full_name: profile.map(|p| p.full_name.clone()),
                        email: profile.map(|p| p.email.clone()),
                        id: student_id,
                    },
                    roadmap_id,
                    roadmap_name,
                    step_title,
                    step_order,
                    submission,
                }
            })
            .collect();

        Ok(Paginated::new(items, total, page))
    }

    /// Approve or reject a submission
    ///
    /// Approval runs the cascade: aggregate recompute and successor unlock
    /// commit with the status change. A second review of the same submission
    /// is a Conflict and changes nothing.
    pub fn review(
        &self,
        caller: &Caller,
        step_progress_id: &str,
        input: ReviewInput,
    ) -> Result<ReviewOutcome, RoadmapError> {
        caller.require(&[Role::Teacher])?;
        validate_review(&input)?;
        let teacher = self.directory.teacher_for_user(&caller.user_id)?;

        let decision = ReviewDecision {
            action: input.action,
            score: input.validation_score,
            notes: input.validation_notes.as_deref(),
        };

        let strict = self.strict_review_scoping;
        let result = self.db.with_conn(|conn| {
            progress::review_submission(conn, step_progress_id, &teacher.id, decision, strict)
        });

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_client_error() {
                    warn!(step_progress = %step_progress_id, error = %e, "Review rejected");
                }
                return Err(e);
            }
        };

        match input.action {
            ReviewAction::Approve => {
                info!(
                    step_progress = %step_progress_id,
                    completed = outcome.aggregate.completed_steps,
                    total = outcome.aggregate.total_steps,
                    "Submission approved"
                );
                self.events.emit(RoadmapEvent::SubmissionApproved {
                    step_progress_id: step_progress_id.to_string(),
                    teacher_profile_id: teacher.id.clone(),
                    unlocked_step_progress_id: outcome.unlocked_step_progress_id.clone(),
                });
            }
            ReviewAction::Reject => {
                self.events.emit(RoadmapEvent::SubmissionRejected {
                    step_progress_id: step_progress_id.to_string(),
                    teacher_profile_id: teacher.id.clone(),
                });
            }
        }

        if outcome.roadmap_completed {
            self.events.emit(RoadmapEvent::RoadmapCompleted {
                progress_id: outcome.aggregate.id.clone(),
                roadmap_id: outcome.aggregate.roadmap_id.clone(),
                student_profile_id: outcome.aggregate.student_profile_id.clone(),
            });
        }

        Ok(outcome)
    }

    // =========================================================================
    // Admin Dashboards
    // =========================================================================

    /// Enrolments of one roadmap with student names
    pub fn roadmap_enrolments(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        page: PageRequest,
    ) -> Result<Paginated<EnrolmentView>, RoadmapError> {
        caller.require(&[Role::Admin])?;

        let (rows, total) = self.db.with_conn(|conn| {
            roadmaps::require_roadmap(conn, roadmap_id)?;
            let rows =
                progress::aggregates_for_roadmap(conn, roadmap_id, page.limit, page.offset())?;
            let total = progress::count_aggregates_for_roadmap(conn, roadmap_id)?;
            Ok((rows, total))
        })?;

        let students = self
            .directory
            .students(&unique_ids(rows.iter().map(|a| &a.student_profile_id)))?;

        let items = rows
            .into_iter()
            .map(|progress| {
                let profile = students.get(&progress.student_profile_id);
                EnrolmentView {
                    student: ProfileRef {
                        id: progress.student_profile_id.clone(),
                        full_name: profile.map(|p| p.full_name.clone()),
                        email: profile.map(|p| p.email.clone()),
                    },
                    progress,
                }
            })
            .collect();

        Ok(Paginated::new(items, total, page))
    }

    pub fn statistics(&self, caller: &Caller) -> Result<Statistics, RoadmapError> {
        caller.require(&[Role::Admin])?;
        self.db.with_conn(|conn| {
            let by_status: BTreeMap<String, i64> =
                roadmaps::count_by_status(conn)?.into_iter().collect();
            Ok(Statistics {
                total_roadmaps: by_status.values().sum(),
                roadmaps_by_status: by_status,
                progress: progress::counters(conn)?,
            })
        })
    }
}

fn validate_review(input: &ReviewInput) -> Result<(), RoadmapError> {
    if let Some(score) = input.validation_score {
        if !(0..=100).contains(&score) {
            return Err(RoadmapError::InvalidInput(
                "validationScore must be between 0 and 100".into(),
            ));
        }
    }
    if let Some(ref notes) = input.validation_notes {
        if notes.chars().count() > MAX_VALIDATION_NOTES_LEN {
            return Err(RoadmapError::InvalidInput(format!(
                "validationNotes must be <= {} characters",
                MAX_VALIDATION_NOTES_LEN
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_input_parsing() {
        let input: ReviewInput = serde_json::from_str(
            r#"{"action": "approve", "validationScore": 90, "validationNotes": "nice"}"#,
        )
        .unwrap();
        assert_eq!(input.action, ReviewAction::Approve);
        assert_eq!(input.validation_score, Some(90));

        assert!(serde_json::from_str::<ReviewInput>(r#"{"action": "maybe"}"#).is_err());
    }

    #[test]
    fn test_review_validation() {
        let mut input = ReviewInput {
            action: ReviewAction::Reject,
            validation_score: Some(101),
            validation_notes: None,
        };
        assert!(matches!(
            validate_review(&input),
            Err(RoadmapError::InvalidInput(_))
        ));

        input.validation_score = Some(0);
        assert!(validate_review(&input).is_ok());

        input.validation_notes = Some("n".repeat(MAX_VALIDATION_NOTES_LEN + 1));
        assert!(matches!(
            validate_review(&input),
            Err(RoadmapError::InvalidInput(_))
        ));
    }
}
