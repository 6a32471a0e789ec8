//! Student progress persistence and the progression cascade
//!
//! Every transition is a conditional update (`WHERE status IN (<legal
//! sources>)`) inside an immediate transaction. When the update touches zero
//! rows the current row is re-read and the state machine decides which error
//! the caller sees, so two reviewers racing on the same submission produce
//! exactly one approval and one Conflict.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::diesel_schema::{student_roadmap_progress, student_step_progress};
use super::directory;
use super::models::{
    current_timestamp, roadmap_status, NewStudentRoadmapProgress, NewStudentStepProgress, RoadmapStep,
    StudentRoadmapProgress, StudentStepProgress,
};
use super::roadmaps;
use crate::error::RoadmapError;
use crate::progression::{self, StepEvent, StepStatus};

/// Status strings that count as a completed step
const COMPLETED_STATUSES: [&str; 2] = ["approved", "completed"];

// ============================================================================
// Types
// ============================================================================

/// Aggregate plus the step rows created with it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedRoadmap {
    pub aggregate: StudentRoadmapProgress,
    pub steps: Vec<StudentStepProgress>,
}

/// Evidence a student submits for a step
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub link: &'a str,
    pub kind: &'a str,
    pub notes: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
}

impl ReviewAction {
    pub fn event(&self) -> StepEvent {
        match self {
            ReviewAction::Approve => StepEvent::Approve,
            ReviewAction::Reject => StepEvent::Reject,
        }
    }
}

/// Teacher's verdict on a submission
#[derive(Debug, Clone, Copy)]
pub struct ReviewDecision<'a> {
    pub action: ReviewAction,
    pub score: Option<i32>,
    pub notes: Option<&'a str>,
}

/// Everything a review changed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub step: StudentStepProgress,
    pub aggregate: StudentRoadmapProgress,
    /// Step progress row flipped from locked to unlocked by this approval
    pub unlocked_step_progress_id: Option<String>,
    /// True only on the approval that completed the roadmap
    pub roadmap_completed: bool,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_aggregate(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
) -> Result<Option<StudentRoadmapProgress>, RoadmapError> {
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::id.eq(aggregate_id))
        .first(conn)
        .optional()?)
}

fn require_aggregate(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
) -> Result<StudentRoadmapProgress, RoadmapError> {
    get_aggregate(conn, aggregate_id)?
        .ok_or_else(|| RoadmapError::NotFound(format!("roadmap progress {}", aggregate_id)))
}

/// Aggregate for a (roadmap, student) pair
pub fn find_aggregate(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    student_profile_id: &str,
) -> Result<Option<StudentRoadmapProgress>, RoadmapError> {
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id))
        .filter(student_roadmap_progress::student_profile_id.eq(student_profile_id))
        .first(conn)
        .optional()?)
}

/// All aggregates of a student, most recently started first
pub fn aggregates_for_student(
    conn: &mut SqliteConnection,
    student_profile_id: &str,
) -> Result<Vec<StudentRoadmapProgress>, RoadmapError> {
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::student_profile_id.eq(student_profile_id))
        .order(student_roadmap_progress::started_at.desc())
        .load(conn)?)
}

/// Aggregates of a student restricted to the given roadmaps
pub fn aggregates_for_student_in(
    conn: &mut SqliteConnection,
    student_profile_id: &str,
    roadmap_ids: &[String],
) -> Result<Vec<StudentRoadmapProgress>, RoadmapError> {
    if roadmap_ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::student_profile_id.eq(student_profile_id))
        .filter(student_roadmap_progress::roadmap_id.eq_any(roadmap_ids))
        .load(conn)?)
}

pub fn aggregates_for_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<StudentRoadmapProgress>, RoadmapError> {
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id))
        .order((
            student_roadmap_progress::started_at.desc(),
            student_roadmap_progress::id.asc(),
        ))
        .limit(limit)
        .offset(offset)
        .load(conn)?)
}

pub fn count_aggregates_for_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<i64, RoadmapError> {
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id))
        .count()
        .get_result(conn)?)
}

pub fn get_aggregates_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<StudentRoadmapProgress>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(student_roadmap_progress::table
        .filter(student_roadmap_progress::id.eq_any(ids))
        .load(conn)?)
}

pub fn get_step_progress(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
) -> Result<Option<StudentStepProgress>, RoadmapError> {
    Ok(student_step_progress::table
        .filter(student_step_progress::id.eq(step_progress_id))
        .first(conn)
        .optional()?)
}

fn require_step_progress(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
) -> Result<StudentStepProgress, RoadmapError> {
    get_step_progress(conn, step_progress_id)?
        .ok_or_else(|| RoadmapError::NotFound(format!("step progress {}", step_progress_id)))
}

/// Step rows of one aggregate (unordered; join with the catalog for order)
pub fn step_progress_for_aggregate(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
) -> Result<Vec<StudentStepProgress>, RoadmapError> {
    Ok(student_step_progress::table
        .filter(student_step_progress::student_roadmap_progress_id.eq(aggregate_id))
        .load(conn)?)
}

fn step_progress_for(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
    roadmap_step_id: &str,
) -> Result<Option<StudentStepProgress>, RoadmapError> {
    Ok(student_step_progress::table
        .filter(student_step_progress::student_roadmap_progress_id.eq(aggregate_id))
        .filter(student_step_progress::roadmap_step_id.eq(roadmap_step_id))
        .first(conn)
        .optional()?)
}

/// Pending submissions query, optionally scoped to a set of roadmaps
fn pending_query<'a>(
    roadmap_ids: Option<&'a [String]>,
) -> student_step_progress::BoxedQuery<'a, diesel::sqlite::Sqlite> {
    let mut query = student_step_progress::table
        .filter(student_step_progress::status.eq(StepStatus::Submitted.as_str()))
        .into_boxed();

    if let Some(ids) = roadmap_ids {
        let aggregate_ids = student_roadmap_progress::table
            .filter(student_roadmap_progress::roadmap_id.eq_any(ids))
            .select(student_roadmap_progress::id);
        query = query.filter(student_step_progress::student_roadmap_progress_id.eq_any(aggregate_ids));
    }

    query
}

/// Submitted steps awaiting review, oldest submission first
pub fn list_pending(
    conn: &mut SqliteConnection,
    roadmap_ids: Option<&[String]>,
    limit: i64,
    offset: i64,
) -> Result<Vec<StudentStepProgress>, RoadmapError> {
    Ok(pending_query(roadmap_ids)
        .order((
            student_step_progress::submitted_at.asc(),
            student_step_progress::id.asc(),
        ))
        .limit(limit)
        .offset(offset)
        .load(conn)?)
}

pub fn count_pending(
    conn: &mut SqliteConnection,
    roadmap_ids: Option<&[String]>,
) -> Result<i64, RoadmapError> {
    Ok(pending_query(roadmap_ids).count().get_result(conn)?)
}

// ============================================================================
// Roadmap Start
// ============================================================================

/// Create the aggregate and one step row per catalog step, all or nothing
///
/// The first step starts `unlocked`, every other step `locked`.
pub fn start_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    student_profile_id: &str,
) -> Result<StartedRoadmap, RoadmapError> {
    conn.immediate_transaction(|conn| {
        let roadmap = roadmaps::require_roadmap(conn, roadmap_id)?;
        if roadmap.status != roadmap_status::ACTIVE {
            return Err(RoadmapError::PreconditionFailed(format!(
                "roadmap is {} and cannot be started",
                roadmap.status
            )));
        }
        if find_aggregate(conn, roadmap_id, student_profile_id)?.is_some() {
            return Err(RoadmapError::Conflict("roadmap already started".into()));
        }

        let steps = roadmaps::get_steps(conn, roadmap_id)?;
        if steps.is_empty() {
            return Err(RoadmapError::PreconditionFailed(
                "roadmap has no steps and cannot be started".into(),
            ));
        }
        let aggregate_id = Uuid::new_v4().to_string();
        let now = current_timestamp();

        let new_aggregate = NewStudentRoadmapProgress {
            id: &aggregate_id,
            roadmap_id,
            student_profile_id,
            total_steps: steps.len() as i32,
            completed_steps: 0,
            progress_percent: 0.0,
            started_at: &now,
            last_activity_at: Some(&now),
        };

        diesel::insert_into(student_roadmap_progress::table)
            .values(&new_aggregate)
            .execute(conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    RoadmapError::Conflict("roadmap already started".into())
                }
                other => RoadmapError::Database(other),
            })?;

        let ids: Vec<String> = steps.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let rows: Vec<NewStudentStepProgress> = steps
            .iter()
            .zip(ids.iter())
            .enumerate()
            .map(|(index, (step, id))| NewStudentStepProgress {
                id,
                student_roadmap_progress_id: &aggregate_id,
                roadmap_step_id: &step.id,
                status: StepStatus::initial(index).as_str(),
                updated_at: &now,
            })
            .collect();

        diesel::insert_into(student_step_progress::table)
            .values(&rows)
            .execute(conn)?;

        debug!(
            aggregate = %aggregate_id,
            steps = rows.len(),
            "Created roadmap progress rows"
        );

        Ok(StartedRoadmap {
            aggregate: require_aggregate(conn, &aggregate_id)?,
            steps: step_progress_for_aggregate(conn, &aggregate_id)?,
        })
    })
}

// ============================================================================
// Step Transitions
// ============================================================================

/// Load a step row and its aggregate, checking the student owns it
fn load_owned(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
    student_profile_id: &str,
) -> Result<(StudentStepProgress, StudentRoadmapProgress), RoadmapError> {
    let step = require_step_progress(conn, step_progress_id)?;
    let aggregate = require_aggregate(conn, &step.student_roadmap_progress_id)?;
    if aggregate.student_profile_id != student_profile_id {
        // Don't reveal other students' rows
        return Err(RoadmapError::NotFound(format!(
            "step progress {}",
            step_progress_id
        )));
    }
    Ok((step, aggregate))
}

/// Position of `step_id` within the ordered catalog
fn position_of(steps: &[RoadmapStep], step_id: &str) -> Result<usize, RoadmapError> {
    steps
        .iter()
        .position(|s| s.id == step_id)
        .ok_or_else(|| RoadmapError::Internal(format!("step {} missing from catalog", step_id)))
}

fn touch_aggregate(
    conn: &mut SqliteConnection,
    aggregate_id: &str,
    now: &str,
) -> Result<(), RoadmapError> {
    diesel::update(
        student_roadmap_progress::table.filter(student_roadmap_progress::id.eq(aggregate_id)),
    )
    .set(student_roadmap_progress::last_activity_at.eq(now))
    .execute(conn)?;
    Ok(())
}

/// Error for a conditional update that matched nothing
fn stale_transition(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
    event: StepEvent,
) -> RoadmapError {
    match require_step_progress(conn, step_progress_id) {
        Ok(current) => match current.step_status() {
            Ok(status) => progression::rejection(status, event),
            Err(e) => e,
        },
        Err(e) => e,
    }
}

/// `unlocked -> in_progress`, re-verifying that the previous step is approved
pub fn start_step(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
    student_profile_id: &str,
) -> Result<StudentStepProgress, RoadmapError> {
    conn.immediate_transaction(|conn| {
        let (step, aggregate) = load_owned(conn, step_progress_id, student_profile_id)?;
        progression::transition(step.step_status()?, StepEvent::Start)?;

        let catalog = roadmaps::get_steps(conn, &aggregate.roadmap_id)?;
        let position = position_of(&catalog, &step.roadmap_step_id)?;
        if position > 0 {
            let previous = &catalog[position - 1];
            let previous_status = match step_progress_for(conn, &aggregate.id, &previous.id)? {
                Some(row) => row.step_status()?,
                None => StepStatus::Locked,
            };
            if !previous_status.is_completed() {
                return Err(RoadmapError::PreconditionFailed(format!(
                    "previous step '{}' is not approved yet",
                    previous.title
                )));
            }
        }

        let now = current_timestamp();
        let updated = diesel::update(
            student_step_progress::table
                .filter(student_step_progress::id.eq(step_progress_id))
                .filter(student_step_progress::status.eq_any(StepEvent::Start.source_strs())),
        )
        .set((
            student_step_progress::status.eq(StepStatus::InProgress.as_str()),
            student_step_progress::started_at.eq(&now),
            student_step_progress::updated_at.eq(&now),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(stale_transition(conn, step_progress_id, StepEvent::Start));
        }

        touch_aggregate(conn, &aggregate.id, &now)?;
        require_step_progress(conn, step_progress_id)
    })
}

/// `in_progress | rejected -> submitted`
///
/// Clears the verdict of a previous review so the row reads as pending.
pub fn submit_evidence(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
    student_profile_id: &str,
    evidence: Evidence<'_>,
) -> Result<StudentStepProgress, RoadmapError> {
    conn.immediate_transaction(|conn| {
        let (step, aggregate) = load_owned(conn, step_progress_id, student_profile_id)?;
        progression::transition(step.step_status()?, StepEvent::Submit)?;

        let now = current_timestamp();
        let updated = diesel::update(
            student_step_progress::table
                .filter(student_step_progress::id.eq(step_progress_id))
                .filter(student_step_progress::status.eq_any(StepEvent::Submit.source_strs())),
        )
        .set((
            student_step_progress::status.eq(StepStatus::Submitted.as_str()),
            student_step_progress::evidence_link.eq(evidence.link),
            student_step_progress::evidence_type.eq(evidence.kind),
            student_step_progress::submission_notes.eq(evidence.notes),
            student_step_progress::validated_by_teacher_profile_id.eq(None::<String>),
            student_step_progress::validation_notes.eq(None::<String>),
            student_step_progress::validation_score.eq(None::<i32>),
            student_step_progress::submitted_at.eq(&now),
            student_step_progress::updated_at.eq(&now),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(stale_transition(conn, step_progress_id, StepEvent::Submit));
        }

        touch_aggregate(conn, &aggregate.id, &now)?;
        require_step_progress(conn, step_progress_id)
    })
}

/// Recount approved steps and refresh percent, activity and completion
///
/// `completed_at` is written once, when the count first reaches the total.
fn recompute_aggregate(
    conn: &mut SqliteConnection,
    aggregate: &StudentRoadmapProgress,
    now: &str,
) -> Result<StudentRoadmapProgress, RoadmapError> {
    let completed: i64 = student_step_progress::table
        .filter(student_step_progress::student_roadmap_progress_id.eq(&aggregate.id))
        .filter(student_step_progress::status.eq_any(COMPLETED_STATUSES))
        .count()
        .get_result(conn)?;
    let completed = completed as i32;

    let completed_at = match aggregate.completed_at {
        Some(ref at) => Some(at.clone()),
        None if aggregate.total_steps > 0 && completed >= aggregate.total_steps => {
            Some(now.to_string())
        }
        None => None,
    };

    diesel::update(
        student_roadmap_progress::table.filter(student_roadmap_progress::id.eq(&aggregate.id)),
    )
    .set((
        student_roadmap_progress::completed_steps.eq(completed),
        student_roadmap_progress::progress_percent
            .eq(progression::progress_percent(completed, aggregate.total_steps)),
        student_roadmap_progress::last_activity_at.eq(now),
        student_roadmap_progress::completed_at.eq(completed_at),
    ))
    .execute(conn)?;

    require_aggregate(conn, &aggregate.id)
}

/// `submitted -> approved | rejected`, running the cascade on approval
///
/// Approval, aggregate recompute and successor unlock commit together. With
/// `assigned_only` the teacher must be a reviewer of the row's roadmap.
pub fn review_submission(
    conn: &mut SqliteConnection,
    step_progress_id: &str,
    teacher_profile_id: &str,
    decision: ReviewDecision<'_>,
    assigned_only: bool,
) -> Result<ReviewOutcome, RoadmapError> {
    conn.immediate_transaction(|conn| {
        if assigned_only {
            let step = require_step_progress(conn, step_progress_id)?;
            let aggregate = require_aggregate(conn, &step.student_roadmap_progress_id)?;
            if !directory::is_reviewer(conn, &aggregate.roadmap_id, teacher_profile_id)? {
                return Err(RoadmapError::Forbidden(
                    "teacher is not a reviewer of this roadmap".into(),
                ));
            }
        }

        let event = decision.action.event();
        let now = current_timestamp();
        let completed_at = match decision.action {
            ReviewAction::Approve => Some(now.as_str()),
            ReviewAction::Reject => None,
        };

        let updated = diesel::update(
            student_step_progress::table
                .filter(student_step_progress::id.eq(step_progress_id))
                .filter(student_step_progress::status.eq_any(event.source_strs())),
        )
        .set((
            student_step_progress::status.eq(event.target().as_str()),
            student_step_progress::validated_by_teacher_profile_id.eq(teacher_profile_id),
            student_step_progress::validation_score.eq(decision.score),
            student_step_progress::validation_notes.eq(decision.notes),
            student_step_progress::completed_at.eq(completed_at),
            student_step_progress::updated_at.eq(&now),
        ))
        .execute(conn)?;

        if updated == 0 {
            return Err(stale_transition(conn, step_progress_id, event));
        }

        let step = require_step_progress(conn, step_progress_id)?;
        let aggregate = require_aggregate(conn, &step.student_roadmap_progress_id)?;

        if decision.action == ReviewAction::Reject {
            touch_aggregate(conn, &aggregate.id, &now)?;
            return Ok(ReviewOutcome {
                step,
                aggregate: require_aggregate(conn, &aggregate.id)?,
                unlocked_step_progress_id: None,
                roadmap_completed: false,
            });
        }

        let was_completed = aggregate.is_completed();
        let aggregate = recompute_aggregate(conn, &aggregate, &now)?;

        let catalog = roadmaps::get_steps(conn, &aggregate.roadmap_id)?;
        let position = position_of(&catalog, &step.roadmap_step_id)?;
        let mut unlocked_step_progress_id = None;

        if let Some(next) = catalog.get(position + 1) {
            if let Some(next_row) = step_progress_for(conn, &aggregate.id, &next.id)? {
                let unlocked = diesel::update(
                    student_step_progress::table
                        .filter(student_step_progress::id.eq(&next_row.id))
                        .filter(
                            student_step_progress::status.eq_any(StepEvent::Unlock.source_strs()),
                        ),
                )
                .set((
                    student_step_progress::status.eq(StepStatus::Unlocked.as_str()),
                    student_step_progress::updated_at.eq(&now),
                ))
                .execute(conn)?;

                if unlocked == 1 {
                    unlocked_step_progress_id = Some(next_row.id);
                }
            }
        }

        let roadmap_completed = !was_completed && aggregate.is_completed();
        if roadmap_completed {
            info!(aggregate = %aggregate.id, "Roadmap completed");
        }

        Ok(ReviewOutcome {
            step,
            aggregate,
            unlocked_step_progress_id,
            roadmap_completed,
        })
    })
}

// ============================================================================
// Stats
// ============================================================================

/// Counters over all progress rows
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressCounters {
    pub enrolments: i64,
    pub completed_enrolments: i64,
    pub approved_steps: i64,
    pub pending_submissions: i64,
    pub average_progress_percent: f64,
}

pub fn counters(conn: &mut SqliteConnection) -> Result<ProgressCounters, RoadmapError> {
    let enrolments: i64 = student_roadmap_progress::table.count().get_result(conn)?;
    let completed_enrolments: i64 = student_roadmap_progress::table
        .filter(student_roadmap_progress::completed_at.is_not_null())
        .count()
        .get_result(conn)?;
    let approved_steps: i64 = student_step_progress::table
        .filter(student_step_progress::status.eq_any(COMPLETED_STATUSES))
        .count()
        .get_result(conn)?;
    let pending_submissions = count_pending(conn, None)?;
    let average: Option<f64> = student_roadmap_progress::table
        .select(diesel::dsl::avg(student_roadmap_progress::progress_percent))
        .first(conn)?;

    Ok(ProgressCounters {
        enrolments,
        completed_enrolments,
        approved_steps,
        pending_submissions,
        average_progress_percent: progression::round_percent(average.unwrap_or(0.0)),
    })
}
