//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! TypeScript types are auto-generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use crate::error::RoadmapError;
use crate::progression::StepStatus;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ============================================================================
// Directory Models (profiles and career roles owned by the wider platform)
// ============================================================================

/// Career role a roadmap prepares students for
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize, TS)]
#[diesel(table_name = target_roles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export)]
pub struct TargetRole {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = student_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub recommended_role_id: Option<String>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = teacher_profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
}

// ============================================================================
// Roadmap Models
// ============================================================================

/// Roadmap row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = roadmaps)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Roadmap {
    pub id: String,
    pub target_role_id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: String,
    pub status: String,
    pub generation_source: String,
    pub generation_metadata_json: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New roadmap for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roadmaps)]
pub struct NewRoadmap<'a> {
    pub id: &'a str,
    pub target_role_id: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub visibility: &'a str,
    pub status: &'a str,
    pub generation_source: &'a str,
    pub generation_metadata_json: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Step row from SELECT query
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = roadmap_steps)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoadmapStep {
    pub id: String,
    pub roadmap_id: String,
    pub step_order: i32,
    pub title: String,
    pub description: String,
    pub learning_objectives: String,
    pub submission_guidelines: String,
    pub resource_links_json: Option<String>,
    pub estimated_duration_hours: i32,
    pub difficulty_level: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New step for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roadmap_steps)]
pub struct NewRoadmapStep<'a> {
    pub id: &'a str,
    pub roadmap_id: &'a str,
    pub step_order: i32,
    pub title: &'a str,
    pub description: &'a str,
    pub learning_objectives: &'a str,
    pub submission_guidelines: &'a str,
    pub resource_links_json: Option<&'a str>,
    pub estimated_duration_hours: i32,
    pub difficulty_level: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Teacher assigned to review submissions for a roadmap
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = roadmap_reviewers)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoadmapReviewer {
    pub roadmap_id: String,
    pub teacher_profile_id: String,
    pub assigned_by: Option<String>,
    pub assigned_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = roadmap_reviewers)]
pub struct NewRoadmapReviewer<'a> {
    pub roadmap_id: &'a str,
    pub teacher_profile_id: &'a str,
    pub assigned_by: Option<&'a str>,
    pub assigned_at: &'a str,
}

// ============================================================================
// Progress Models
// ============================================================================

/// Per-student aggregate over one roadmap
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = student_roadmap_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentRoadmapProgress {
    pub id: String,
    pub roadmap_id: String,
    pub student_profile_id: String,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub progress_percent: f64,
    pub started_at: String,
    pub last_activity_at: Option<String>,
    pub completed_at: Option<String>,
}

impl StudentRoadmapProgress {
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = student_roadmap_progress)]
pub struct NewStudentRoadmapProgress<'a> {
    pub id: &'a str,
    pub roadmap_id: &'a str,
    pub student_profile_id: &'a str,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub progress_percent: f64,
    pub started_at: &'a str,
    pub last_activity_at: Option<&'a str>,
}

/// State machine instance for one student on one step
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = student_step_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentStepProgress {
    pub id: String,
    pub student_roadmap_progress_id: String,
    pub roadmap_step_id: String,
    pub status: String,
    pub evidence_link: Option<String>,
    pub evidence_type: Option<String>,
    pub submission_notes: Option<String>,
    pub validated_by_teacher_profile_id: Option<String>,
    pub validation_notes: Option<String>,
    pub validation_score: Option<i32>,
    pub started_at: Option<String>,
    pub submitted_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

impl StudentStepProgress {
    /// Parsed status column
    pub fn step_status(&self) -> Result<StepStatus, RoadmapError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = student_step_progress)]
pub struct NewStudentStepProgress<'a> {
    pub id: &'a str,
    pub student_roadmap_progress_id: &'a str,
    pub roadmap_step_id: &'a str,
    pub status: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Constants
// ============================================================================

/// Roadmap lifecycle states
pub mod roadmap_status {
    pub const DRAFT: &str = "draft";
    pub const ACTIVE: &str = "active";
    pub const ARCHIVED: &str = "archived";

    pub const ALL: [&str; 3] = [DRAFT, ACTIVE, ARCHIVED];

    /// Allowed lifecycle moves; staying in place is always allowed
    pub fn can_transition(from: &str, to: &str) -> bool {
        from == to
            || matches!(
                (from, to),
                (DRAFT, ACTIVE) | (DRAFT, ARCHIVED) | (ACTIVE, ARCHIVED) | (ARCHIVED, ACTIVE)
            )
    }
}

/// Who can see a roadmap
pub mod visibility {
    pub const PRIVATE: &str = "private";
    pub const SCHOOL: &str = "school";
    pub const PUBLIC: &str = "public";

    pub const ALL: [&str; 3] = [PRIVATE, SCHOOL, PUBLIC];
}

pub mod difficulty_levels {
    pub const BEGINNER: &str = "beginner";
    pub const INTERMEDIATE: &str = "intermediate";
    pub const ADVANCED: &str = "advanced";

    pub const ALL: [&str; 3] = [BEGINNER, INTERMEDIATE, ADVANCED];
}

/// How a roadmap was authored
pub mod generation_sources {
    pub const MANUAL: &str = "manual";
    pub const AI: &str = "ai";

    pub const ALL: [&str; 2] = [MANUAL, AI];
}

pub mod evidence_types {
    pub const URL: &str = "url";

    pub const ALL: [&str; 1] = [URL];

    pub fn is_valid(kind: &str) -> bool {
        ALL.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roadmap_status_transitions() {
        assert!(roadmap_status::can_transition("draft", "active"));
        assert!(roadmap_status::can_transition("active", "archived"));
        assert!(roadmap_status::can_transition("archived", "active"));
        assert!(roadmap_status::can_transition("active", "active"));
        assert!(!roadmap_status::can_transition("active", "draft"));
        assert!(!roadmap_status::can_transition("archived", "draft"));
    }

    #[test]
    fn test_timestamp_format() {
        let ts = current_timestamp();
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
