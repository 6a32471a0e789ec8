//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::RoadmapError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), RoadmapError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, RoadmapError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")?;

    let row = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result::<VersionRow>(conn)
        .optional()?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), RoadmapError> {
    conn.batch_execute("DELETE FROM schema_version")?;
    diesel::sql_query("INSERT INTO schema_version (version) VALUES (?)")
        .bind::<Integer, _>(version)
        .execute(conn)?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), RoadmapError> {
    conn.transaction(|conn| {
        conn.batch_execute(DIRECTORY_SCHEMA)?;
        conn.batch_execute(CATALOG_SCHEMA)?;
        conn.batch_execute(REVIEWERS_SCHEMA)?;
        conn.batch_execute(PROGRESS_SCHEMA)?;
        conn.batch_execute(INDEXES_SCHEMA)?;
        Ok(())
    })
}

fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), RoadmapError> {
    conn.transaction(|conn| {
        if from_version < 2 {
            // v1 had no reviewer assignments
            conn.batch_execute(REVIEWERS_SCHEMA)?;
        }
        set_schema_version(conn, SCHEMA_VERSION)
    })
}

/// Collaborator data owned by the wider platform (profiles, career roles)
const DIRECTORY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS target_roles (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS student_profiles (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL,
    -- Latest AI recommendation from the questionnaire subsystem
    recommended_role_id TEXT
);

CREATE TABLE IF NOT EXISTS teacher_profiles (
    id TEXT PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    email TEXT NOT NULL
);
"#;

/// Roadmaps and their ordered step catalog
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roadmaps (
    id TEXT PRIMARY KEY NOT NULL,
    target_role_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    visibility TEXT NOT NULL DEFAULT 'school',
    status TEXT NOT NULL DEFAULT 'draft',

    -- How the roadmap was authored
    generation_source TEXT NOT NULL DEFAULT 'manual',
    generation_metadata_json TEXT,

    created_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS roadmap_steps (
    id TEXT PRIMARY KEY NOT NULL,
    roadmap_id TEXT NOT NULL,

    -- 1..n, contiguous within a roadmap
    step_order INTEGER NOT NULL,

    title TEXT NOT NULL,
    description TEXT NOT NULL,
    learning_objectives TEXT NOT NULL,
    submission_guidelines TEXT NOT NULL,
    resource_links_json TEXT,
    estimated_duration_hours INTEGER NOT NULL CHECK (estimated_duration_hours > 0),
    difficulty_level TEXT NOT NULL DEFAULT 'beginner',

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (roadmap_id, step_order),
    FOREIGN KEY (roadmap_id) REFERENCES roadmaps(id) ON DELETE CASCADE
);
"#;

const REVIEWERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS roadmap_reviewers (
    roadmap_id TEXT NOT NULL,
    teacher_profile_id TEXT NOT NULL,
    assigned_by TEXT,
    assigned_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (roadmap_id, teacher_profile_id),
    FOREIGN KEY (roadmap_id) REFERENCES roadmaps(id) ON DELETE CASCADE
);
"#;

/// Per-student aggregate and per-step state machine rows
const PROGRESS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS student_roadmap_progress (
    id TEXT PRIMARY KEY NOT NULL,
    roadmap_id TEXT NOT NULL,
    student_profile_id TEXT NOT NULL,
    total_steps INTEGER NOT NULL,
    completed_steps INTEGER NOT NULL DEFAULT 0,
    progress_percent REAL NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    last_activity_at TEXT,
    completed_at TEXT,

    UNIQUE (roadmap_id, student_profile_id),
    FOREIGN KEY (roadmap_id) REFERENCES roadmaps(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS student_step_progress (
    id TEXT PRIMARY KEY NOT NULL,
    student_roadmap_progress_id TEXT NOT NULL,
    roadmap_step_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'locked',

    -- Evidence
    evidence_link TEXT,
    evidence_type TEXT,
    submission_notes TEXT,

    -- Validation
    validated_by_teacher_profile_id TEXT,
    validation_notes TEXT,
    validation_score INTEGER CHECK (validation_score BETWEEN 0 AND 100),

    started_at TEXT,
    submitted_at TEXT,
    completed_at TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (student_roadmap_progress_id, roadmap_step_id),
    FOREIGN KEY (student_roadmap_progress_id)
        REFERENCES student_roadmap_progress(id) ON DELETE CASCADE,
    FOREIGN KEY (roadmap_step_id) REFERENCES roadmap_steps(id) ON DELETE CASCADE
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_roadmaps_status ON roadmaps(status);
CREATE INDEX IF NOT EXISTS idx_roadmaps_target_role ON roadmaps(target_role_id);
CREATE INDEX IF NOT EXISTS idx_roadmap_steps_order ON roadmap_steps(roadmap_id, step_order);
CREATE INDEX IF NOT EXISTS idx_progress_student ON student_roadmap_progress(student_profile_id);
CREATE INDEX IF NOT EXISTS idx_step_progress_status ON student_step_progress(status);
CREATE INDEX IF NOT EXISTS idx_step_progress_parent ON student_step_progress(student_roadmap_progress_id);
CREATE INDEX IF NOT EXISTS idx_reviewers_teacher ON roadmap_reviewers(teacher_profile_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use diesel::Connection;

    #[test]
    fn test_init_schema_is_idempotent() {
        let mut conn = SqliteConnection::establish(":memory:").expect("in-memory db");
        init_schema(&mut conn).expect("first init");
        init_schema(&mut conn).expect("second init");
        assert_eq!(get_schema_version(&mut conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_from_v1_adds_reviewers() {
        let mut conn = SqliteConnection::establish(":memory:").expect("in-memory db");
        conn.batch_execute(DIRECTORY_SCHEMA).unwrap();
        conn.batch_execute(CATALOG_SCHEMA).unwrap();
        get_schema_version(&mut conn).unwrap();
        set_schema_version(&mut conn, 1).unwrap();

        init_schema(&mut conn).expect("migrate");
        assert_eq!(get_schema_version(&mut conn).unwrap(), SCHEMA_VERSION);
        conn.batch_execute("SELECT roadmap_id FROM roadmap_reviewers")
            .expect("reviewers table exists");
    }
}
