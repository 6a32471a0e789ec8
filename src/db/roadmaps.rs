//! Roadmap and step catalog operations using Diesel
//!
//! Steps of a roadmap always carry the contiguous orders `1..=n`. Inserts,
//! deletes and reorders renumber inside one transaction, parking the rows
//! being moved at negative orders first so the `(roadmap_id, step_order)`
//! unique index never sees a transient duplicate.

use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::diesel_schema::{
    roadmap_reviewers, roadmap_steps, roadmaps, student_roadmap_progress, student_step_progress,
};
use super::models::{
    current_timestamp, difficulty_levels, generation_sources, roadmap_status, visibility,
    NewRoadmap, NewRoadmapStep, Roadmap, RoadmapStep,
};
use crate::error::RoadmapError;

// ============================================================================
// Input Types
// ============================================================================

/// Input for creating a roadmap
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoadmapInput {
    #[serde(default)]
    pub id: Option<String>,
    pub target_role_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: String,
    #[serde(default = "default_generation_source")]
    pub generation_source: String,
    #[serde(default)]
    pub generation_metadata_json: Option<String>,
}

fn default_visibility() -> String {
    visibility::SCHOOL.to_string()
}
fn default_generation_source() -> String {
    generation_sources::MANUAL.to_string()
}

/// Partial update of a roadmap
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoadmapInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Input for creating a step
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStepInput {
    /// 1-based insert position; appended when absent
    #[serde(default)]
    pub step_order: Option<i32>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub learning_objectives: String,
    #[serde(default)]
    pub submission_guidelines: String,
    #[serde(default)]
    pub resource_links: Vec<String>,
    pub estimated_duration_hours: i32,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: String,
}

fn default_difficulty() -> String {
    difficulty_levels::BEGINNER.to_string()
}

/// Partial update of a step's content (never its position)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStepInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub learning_objectives: Option<String>,
    #[serde(default)]
    pub submission_guidelines: Option<String>,
    #[serde(default)]
    pub resource_links: Option<Vec<String>>,
    #[serde(default)]
    pub estimated_duration_hours: Option<i32>,
    #[serde(default)]
    pub difficulty_level: Option<String>,
}

/// Filters for listing roadmaps
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub target_role_id: Option<String>,
}

/// Roadmap with its ordered steps
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapWithSteps {
    #[serde(flatten)]
    pub roadmap: Roadmap,
    pub steps: Vec<RoadmapStep>,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<Option<Roadmap>, RoadmapError> {
    Ok(roadmaps::table
        .filter(roadmaps::id.eq(roadmap_id))
        .first(conn)
        .optional()?)
}

/// Get a roadmap or fail with NotFound
pub fn require_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<Roadmap, RoadmapError> {
    get_roadmap(conn, roadmap_id)?
        .ok_or_else(|| RoadmapError::NotFound(format!("roadmap {}", roadmap_id)))
}

pub fn get_roadmaps_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<Roadmap>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(roadmaps::table.filter(roadmaps::id.eq_any(ids)).load(conn)?)
}

fn filtered<'a>(query: &'a RoadmapQuery) -> roadmaps::BoxedQuery<'a, diesel::sqlite::Sqlite> {
    let mut base = roadmaps::table.into_boxed();
    if let Some(ref status) = query.status {
        base = base.filter(roadmaps::status.eq(status));
    }
    if let Some(ref role) = query.target_role_id {
        base = base.filter(roadmaps::target_role_id.eq(role));
    }
    base
}

/// List roadmaps, newest first
pub fn list_roadmaps(
    conn: &mut SqliteConnection,
    query: &RoadmapQuery,
    limit: i64,
    offset: i64,
) -> Result<Vec<Roadmap>, RoadmapError> {
    Ok(filtered(query)
        .order((roadmaps::created_at.desc(), roadmaps::id.asc()))
        .limit(limit)
        .offset(offset)
        .load(conn)?)
}

pub fn count_roadmaps(
    conn: &mut SqliteConnection,
    query: &RoadmapQuery,
) -> Result<i64, RoadmapError> {
    Ok(filtered(query).count().get_result(conn)?)
}

/// Roadmap counts grouped by lifecycle status
pub fn count_by_status(conn: &mut SqliteConnection) -> Result<Vec<(String, i64)>, RoadmapError> {
    Ok(roadmaps::table
        .group_by(roadmaps::status)
        .select((roadmaps::status, diesel::dsl::count_star()))
        .load(conn)?)
}

pub fn get_step(
    conn: &mut SqliteConnection,
    step_id: &str,
) -> Result<Option<RoadmapStep>, RoadmapError> {
    Ok(roadmap_steps::table
        .filter(roadmap_steps::id.eq(step_id))
        .first(conn)
        .optional()?)
}

/// Steps of a roadmap in ascending order
pub fn get_steps(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<Vec<RoadmapStep>, RoadmapError> {
    Ok(roadmap_steps::table
        .filter(roadmap_steps::roadmap_id.eq(roadmap_id))
        .order(roadmap_steps::step_order.asc())
        .load(conn)?)
}

pub fn get_steps_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<RoadmapStep>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(roadmap_steps::table
        .filter(roadmap_steps::id.eq_any(ids))
        .load(conn)?)
}

pub fn step_count(conn: &mut SqliteConnection, roadmap_id: &str) -> Result<i64, RoadmapError> {
    Ok(roadmap_steps::table
        .filter(roadmap_steps::roadmap_id.eq(roadmap_id))
        .count()
        .get_result(conn)?)
}

pub fn get_roadmap_with_steps(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<Option<RoadmapWithSteps>, RoadmapError> {
    let roadmap = match get_roadmap(conn, roadmap_id)? {
        Some(r) => r,
        None => return Ok(None),
    };
    let steps = get_steps(conn, roadmap_id)?;
    Ok(Some(RoadmapWithSteps { roadmap, steps }))
}

/// Whether any student has started this roadmap
pub fn has_progress(conn: &mut SqliteConnection, roadmap_id: &str) -> Result<bool, RoadmapError> {
    let count: i64 = student_roadmap_progress::table
        .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a roadmap in `draft`
pub fn create_roadmap(
    conn: &mut SqliteConnection,
    input: &CreateRoadmapInput,
    created_by: Option<&str>,
) -> Result<Roadmap, RoadmapError> {
    let id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = current_timestamp();

    let new_roadmap = NewRoadmap {
        id: &id,
        target_role_id: &input.target_role_id,
        name: &input.name,
        description: input.description.as_deref(),
        visibility: &input.visibility,
        status: roadmap_status::DRAFT,
        generation_source: &input.generation_source,
        generation_metadata_json: input.generation_metadata_json.as_deref(),
        created_by,
        created_at: &now,
        updated_at: &now,
    };

    diesel::insert_into(roadmaps::table)
        .values(&new_roadmap)
        .execute(conn)?;

    require_roadmap(conn, &id)
}

pub fn update_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    input: &UpdateRoadmapInput,
) -> Result<Roadmap, RoadmapError> {
    let current = require_roadmap(conn, roadmap_id)?;

    diesel::update(roadmaps::table.filter(roadmaps::id.eq(roadmap_id)))
        .set((
            roadmaps::name.eq(input.name.as_deref().unwrap_or(&current.name)),
            roadmaps::description.eq(input
                .description
                .as_deref()
                .or(current.description.as_deref())),
            roadmaps::visibility.eq(input.visibility.as_deref().unwrap_or(&current.visibility)),
            roadmaps::status.eq(input.status.as_deref().unwrap_or(&current.status)),
            roadmaps::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;

    require_roadmap(conn, roadmap_id)
}

/// Fail with Conflict when students have started the roadmap
fn ensure_no_progress(conn: &mut SqliteConnection, roadmap_id: &str) -> Result<(), RoadmapError> {
    if has_progress(conn, roadmap_id)? {
        return Err(RoadmapError::Conflict(
            "roadmap has student progress; its steps cannot be added, removed or reordered"
                .into(),
        ));
    }
    Ok(())
}

/// Delete a roadmap with its steps and reviewers
///
/// Student progress blocks the delete unless `cascade` is set, in which case
/// it is removed in the same transaction.
pub fn delete_roadmap(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    cascade: bool,
) -> Result<bool, RoadmapError> {
    conn.immediate_transaction(|conn| {
        if get_roadmap(conn, roadmap_id)?.is_none() {
            return Ok(false);
        }
        if !cascade && has_progress(conn, roadmap_id)? {
            return Err(RoadmapError::Conflict(
                "roadmap has student progress; pass cascade=true to delete it".into(),
            ));
        }

        let aggregate_ids = student_roadmap_progress::table
            .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id))
            .select(student_roadmap_progress::id);

        diesel::delete(
            student_step_progress::table
                .filter(student_step_progress::student_roadmap_progress_id.eq_any(aggregate_ids)),
        )
        .execute(conn)?;

        diesel::delete(
            student_roadmap_progress::table
                .filter(student_roadmap_progress::roadmap_id.eq(roadmap_id)),
        )
        .execute(conn)?;

        diesel::delete(
            roadmap_reviewers::table.filter(roadmap_reviewers::roadmap_id.eq(roadmap_id)),
        )
        .execute(conn)?;

        diesel::delete(roadmap_steps::table.filter(roadmap_steps::roadmap_id.eq(roadmap_id)))
            .execute(conn)?;

        let deleted = diesel::delete(roadmaps::table.filter(roadmaps::id.eq(roadmap_id)))
            .execute(conn)?;

        Ok(deleted > 0)
    })
}

/// Move every step at `from_order` or later by `delta` positions
fn shift_steps(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    from_order: i32,
    delta: i32,
) -> Result<(), RoadmapError> {
    diesel::sql_query(
        "UPDATE roadmap_steps SET step_order = -step_order WHERE roadmap_id = ? AND step_order >= ?",
    )
    .bind::<Text, _>(roadmap_id)
    .bind::<Integer, _>(from_order)
    .execute(conn)?;

    diesel::sql_query(
        "UPDATE roadmap_steps SET step_order = ? - step_order WHERE roadmap_id = ? AND step_order < 0",
    )
    .bind::<Integer, _>(delta)
    .bind::<Text, _>(roadmap_id)
    .execute(conn)?;

    Ok(())
}

fn resource_links_json(links: &[String]) -> Result<Option<String>, RoadmapError> {
    if links.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(links)?))
    }
}

/// Insert a step at `input.step_order` (or append), keeping orders contiguous
pub fn insert_step(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    input: &CreateStepInput,
) -> Result<RoadmapStep, RoadmapError> {
    conn.immediate_transaction(|conn| {
        require_roadmap(conn, roadmap_id)?;
        ensure_no_progress(conn, roadmap_id)?;

        let count = step_count(conn, roadmap_id)? as i32;
        let position = input.step_order.unwrap_or(count + 1);
        if position < 1 || position > count + 1 {
            return Err(RoadmapError::InvalidInput(format!(
                "stepOrder must be between 1 and {}",
                count + 1
            )));
        }

        if position <= count {
            shift_steps(conn, roadmap_id, position, 1)?;
        }

        let id = Uuid::new_v4().to_string();
        let now = current_timestamp();
        let links = resource_links_json(&input.resource_links)?;

        let new_step = NewRoadmapStep {
            id: &id,
            roadmap_id,
            step_order: position,
            title: &input.title,
            description: &input.description,
            learning_objectives: &input.learning_objectives,
            submission_guidelines: &input.submission_guidelines,
            resource_links_json: links.as_deref(),
            estimated_duration_hours: input.estimated_duration_hours,
            difficulty_level: &input.difficulty_level,
            created_at: &now,
            updated_at: &now,
        };

        diesel::insert_into(roadmap_steps::table)
            .values(&new_step)
            .execute(conn)?;

        get_step(conn, &id)?
            .ok_or_else(|| RoadmapError::Internal("Failed to retrieve created step".into()))
    })
}

pub fn update_step(
    conn: &mut SqliteConnection,
    step_id: &str,
    input: &UpdateStepInput,
) -> Result<RoadmapStep, RoadmapError> {
    let current = get_step(conn, step_id)?
        .ok_or_else(|| RoadmapError::NotFound(format!("step {}", step_id)))?;

    let links = match input.resource_links {
        Some(ref links) => resource_links_json(links)?,
        None => current.resource_links_json.clone(),
    };

    diesel::update(roadmap_steps::table.filter(roadmap_steps::id.eq(step_id)))
        .set((
            roadmap_steps::title.eq(input.title.as_deref().unwrap_or(&current.title)),
            roadmap_steps::description
                .eq(input.description.as_deref().unwrap_or(&current.description)),
            roadmap_steps::learning_objectives.eq(input
                .learning_objectives
                .as_deref()
                .unwrap_or(&current.learning_objectives)),
            roadmap_steps::submission_guidelines.eq(input
                .submission_guidelines
                .as_deref()
                .unwrap_or(&current.submission_guidelines)),
            roadmap_steps::resource_links_json.eq(links),
            roadmap_steps::estimated_duration_hours.eq(input
                .estimated_duration_hours
                .unwrap_or(current.estimated_duration_hours)),
            roadmap_steps::difficulty_level.eq(input
                .difficulty_level
                .as_deref()
                .unwrap_or(&current.difficulty_level)),
            roadmap_steps::updated_at.eq(current_timestamp()),
        ))
        .execute(conn)?;

    get_step(conn, step_id)?
        .ok_or_else(|| RoadmapError::Internal("Failed to retrieve updated step".into()))
}

/// Delete a step and close the gap it leaves
///
/// An active roadmap keeps at least one step.
pub fn delete_step(conn: &mut SqliteConnection, step_id: &str) -> Result<bool, RoadmapError> {
    conn.immediate_transaction(|conn| {
        let step = match get_step(conn, step_id)? {
            Some(s) => s,
            None => return Ok(false),
        };
        ensure_no_progress(conn, &step.roadmap_id)?;

        let roadmap = require_roadmap(conn, &step.roadmap_id)?;
        if roadmap.status == roadmap_status::ACTIVE && step_count(conn, &step.roadmap_id)? <= 1 {
            return Err(RoadmapError::PreconditionFailed(
                "an active roadmap needs at least one step".into(),
            ));
        }

        diesel::delete(roadmap_steps::table.filter(roadmap_steps::id.eq(step_id)))
            .execute(conn)?;

        shift_steps(conn, &step.roadmap_id, step.step_order + 1, -1)?;
        Ok(true)
    })
}

/// Rewrite step orders to follow `ordered_ids`, which must be an exact
/// permutation of the roadmap's step ids
pub fn reorder_steps(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    ordered_ids: &[String],
) -> Result<Vec<RoadmapStep>, RoadmapError> {
    conn.immediate_transaction(|conn| {
        require_roadmap(conn, roadmap_id)?;
        ensure_no_progress(conn, roadmap_id)?;

        let mut current: Vec<String> = get_steps(conn, roadmap_id)?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let mut requested = ordered_ids.to_vec();
        current.sort();
        requested.sort();
        requested.dedup();
        if requested.len() != ordered_ids.len() || current != requested {
            return Err(RoadmapError::InvalidInput(
                "stepIds must list every step of the roadmap exactly once".into(),
            ));
        }

        diesel::sql_query(
            "UPDATE roadmap_steps SET step_order = -step_order WHERE roadmap_id = ?",
        )
        .bind::<Text, _>(roadmap_id)
        .execute(conn)?;

        let now = current_timestamp();
        for (index, step_id) in ordered_ids.iter().enumerate() {
            diesel::update(
                roadmap_steps::table
                    .filter(roadmap_steps::roadmap_id.eq(roadmap_id))
                    .filter(roadmap_steps::id.eq(step_id)),
            )
            .set((
                roadmap_steps::step_order.eq(index as i32 + 1),
                roadmap_steps::updated_at.eq(&now),
            ))
            .execute(conn)?;
        }

        get_steps(conn, roadmap_id)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RoadmapDb;

    fn roadmap_input(name: &str) -> CreateRoadmapInput {
        CreateRoadmapInput {
            id: None,
            target_role_id: "role-backend".into(),
            name: name.into(),
            description: None,
            visibility: visibility::SCHOOL.into(),
            generation_source: generation_sources::MANUAL.into(),
            generation_metadata_json: None,
        }
    }

    fn step_input(title: &str, order: Option<i32>) -> CreateStepInput {
        CreateStepInput {
            step_order: order,
            title: title.into(),
            description: format!("{} description", title),
            learning_objectives: "objectives".into(),
            submission_guidelines: "link a repo".into(),
            resource_links: vec![],
            estimated_duration_hours: 4,
            difficulty_level: difficulty_levels::BEGINNER.into(),
        }
    }

    fn titles(conn: &mut SqliteConnection, roadmap_id: &str) -> Vec<(i32, String)> {
        get_steps(conn, roadmap_id)
            .unwrap()
            .into_iter()
            .map(|s| (s.step_order, s.title))
            .collect()
    }

    #[test]
    fn test_create_roadmap_starts_in_draft() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), Some("admin-1"))?;
            assert_eq!(roadmap.status, roadmap_status::DRAFT);
            assert_eq!(roadmap.created_by.as_deref(), Some("admin-1"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_append_and_middle_keep_orders_contiguous() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            insert_step(conn, &roadmap.id, &step_input("A", None))?;
            insert_step(conn, &roadmap.id, &step_input("C", None))?;
            insert_step(conn, &roadmap.id, &step_input("B", Some(2)))?;
            insert_step(conn, &roadmap.id, &step_input("Start", Some(1)))?;

            assert_eq!(
                titles(conn, &roadmap.id),
                vec![
                    (1, "Start".to_string()),
                    (2, "A".to_string()),
                    (3, "B".to_string()),
                    (4, "C".to_string()),
                ]
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_insert_rejects_gap() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            let result = insert_step(conn, &roadmap.id, &step_input("A", Some(3)));
            assert!(matches!(result, Err(RoadmapError::InvalidInput(_))));
            assert_eq!(step_count(conn, &roadmap.id)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_delete_step_closes_gap() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            insert_step(conn, &roadmap.id, &step_input("A", None))?;
            let b = insert_step(conn, &roadmap.id, &step_input("B", None))?;
            insert_step(conn, &roadmap.id, &step_input("C", None))?;

            assert!(delete_step(conn, &b.id)?);
            assert!(!delete_step(conn, &b.id)?);
            assert_eq!(
                titles(conn, &roadmap.id),
                vec![(1, "A".to_string()), (2, "C".to_string())]
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reorder_requires_permutation() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            let a = insert_step(conn, &roadmap.id, &step_input("A", None))?;
            let b = insert_step(conn, &roadmap.id, &step_input("B", None))?;
            let c = insert_step(conn, &roadmap.id, &step_input("C", None))?;

            let bad = reorder_steps(conn, &roadmap.id, &[a.id.clone(), b.id.clone()]);
            assert!(matches!(bad, Err(RoadmapError::InvalidInput(_))));
            let dup = reorder_steps(
                conn,
                &roadmap.id,
                &[a.id.clone(), a.id.clone(), b.id.clone()],
            );
            assert!(matches!(dup, Err(RoadmapError::InvalidInput(_))));

            let steps = reorder_steps(conn, &roadmap.id, &[c.id.clone(), a.id.clone(), b.id.clone()])?;
            let ids: Vec<_> = steps.iter().map(|s| s.id.clone()).collect();
            assert_eq!(ids, vec![c.id, a.id, b.id]);
            assert_eq!(
                steps.iter().map(|s| s.step_order).collect::<Vec<_>>(),
                vec![1, 2, 3]
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_structural_edits_blocked_by_progress() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            let a = insert_step(conn, &roadmap.id, &step_input("A", None))?;
            activate(conn, &roadmap.id)?;
            crate::db::progress::start_roadmap(conn, &roadmap.id, "student-1")?;

            let added = insert_step(conn, &roadmap.id, &step_input("B", None));
            assert!(matches!(added, Err(RoadmapError::Conflict(_))));
            assert!(matches!(delete_step(conn, &a.id), Err(RoadmapError::Conflict(_))));
            assert!(matches!(
                reorder_steps(conn, &roadmap.id, &[a.id.clone()]),
                Err(RoadmapError::Conflict(_))
            ));

            // content edits stay allowed
            let edited = update_step(
                conn,
                &a.id,
                &UpdateStepInput {
                    estimated_duration_hours: Some(6),
                    ..Default::default()
                },
            )?;
            assert_eq!(edited.estimated_duration_hours, 6);

            assert!(matches!(
                delete_roadmap(conn, &roadmap.id, false),
                Err(RoadmapError::Conflict(_))
            ));
            assert!(delete_roadmap(conn, &roadmap.id, true)?);
            assert!(get_roadmap(conn, &roadmap.id)?.is_none());
            assert!(!has_progress(conn, &roadmap.id)?);
            assert!(!delete_roadmap(conn, &roadmap.id, true)?);
            Ok(())
        })
        .unwrap();
    }

    fn activate(conn: &mut SqliteConnection, roadmap_id: &str) -> Result<Roadmap, RoadmapError> {
        update_roadmap(
            conn,
            roadmap_id,
            &UpdateRoadmapInput {
                status: Some(roadmap_status::ACTIVE.into()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_active_roadmap_keeps_last_step() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            let a = insert_step(conn, &roadmap.id, &step_input("A", None))?;
            let b = insert_step(conn, &roadmap.id, &step_input("B", None))?;
            activate(conn, &roadmap.id)?;

            assert!(delete_step(conn, &a.id)?);
            assert!(matches!(
                delete_step(conn, &b.id),
                Err(RoadmapError::PreconditionFailed(_))
            ));
            assert_eq!(titles(conn, &roadmap.id), vec![(1, "B".to_string())]);

            // drafts may be emptied
            let draft = create_roadmap(conn, &roadmap_input("Draft Track"), None)?;
            let only = insert_step(conn, &draft.id, &step_input("Only", None))?;
            assert!(delete_step(conn, &only.id)?);
            assert_eq!(step_count(conn, &draft.id)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_update_step_keeps_unset_fields() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let roadmap = create_roadmap(conn, &roadmap_input("Backend Track"), None)?;
            let step = insert_step(conn, &roadmap.id, &step_input("A", None))?;
            let updated = update_step(
                conn,
                &step.id,
                &UpdateStepInput {
                    title: Some("A2".into()),
                    resource_links: Some(vec!["https://doc.rust-lang.org".into()]),
                    ..Default::default()
                },
            )?;
            assert_eq!(updated.title, "A2");
            assert_eq!(updated.description, step.description);
            assert_eq!(updated.step_order, 1);
            assert_eq!(
                updated.resource_links_json.as_deref(),
                Some(r#"["https://doc.rust-lang.org"]"#)
            );
            Ok(())
        })
        .unwrap();
    }
}
