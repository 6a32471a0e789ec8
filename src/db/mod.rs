//! SQLite database module for roadmaps and student progress
//!
//! ## Architecture
//!
//! - Diesel over SQLite, pooled with r2d2
//! - Every pooled connection enforces foreign keys and a busy timeout
//! - Multi-row mutations run inside `immediate_transaction` so SQLite takes
//!   the write lock before the first read of the transaction
//!
//! ## Tables
//!
//! - `roadmaps` / `roadmap_steps` - admin-authored catalog
//! - `student_roadmap_progress` - one aggregate per (roadmap, student)
//! - `student_step_progress` - one state machine row per (aggregate, step)
//! - `roadmap_reviewers` - teachers assigned to review a roadmap
//! - `target_roles`, `student_profiles`, `teacher_profiles` - platform directory

pub mod diesel_schema;
pub mod directory;
pub mod models;
pub mod progress;
pub mod roadmaps;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RoadmapError;
use diesel_schema::{roadmaps as roadmaps_table, student_roadmap_progress, student_step_progress};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied when r2d2 hands out a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionOptions {
    busy_timeout_ms: u32,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database for the roadmap service
pub struct RoadmapDb {
    pool: DbPool,
}

impl RoadmapDb {
    /// Open or create the database file under `storage_dir`
    pub fn open(
        storage_dir: &Path,
        file_name: &str,
        pool_size: u32,
        busy_timeout_ms: u32,
    ) -> Result<Self, RoadmapError> {
        let db_path = storage_dir.join(file_name);
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms,
                wal: true,
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// The pool holds exactly one connection that never expires, since every
    /// new SQLite `:memory:` connection would be a separate empty database.
    pub fn open_in_memory() -> Result<Self, RoadmapError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(ConnectionOptions {
                busy_timeout_ms: 5000,
                wal: false,
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), RoadmapError> {
        self.with_conn(schema::init_schema)
    }

    /// Run `f` with a pooled connection
    ///
    /// Do not call back into `with_conn` from inside `f`: the in-memory pool
    /// has a single connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, RoadmapError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, RoadmapError>,
    {
        let mut conn = self.pool.get()?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, RoadmapError> {
        self.with_conn(|conn| {
            let roadmap_count: i64 = roadmaps_table::table.count().get_result(conn)?;
            let enrolment_count: i64 = student_roadmap_progress::table.count().get_result(conn)?;
            let step_progress_count: i64 = student_step_progress::table.count().get_result(conn)?;

            Ok(DbStats {
                roadmap_count: roadmap_count as u64,
                enrolment_count: enrolment_count as u64,
                step_progress_count: step_progress_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbStats {
    pub roadmap_count: u64,
    pub enrolment_count: u64,
    pub step_progress_count: u64,
}
