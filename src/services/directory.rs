//! Profile and career-role lookups
//!
//! Profiles and target roles are owned by the wider platform. The services
//! only see them through [`Directory`], so a deployment can swap the
//! SQLite-backed lookup for a remote one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::directory as repo;
use crate::db::models::{StudentProfile, TargetRole, TeacherProfile};
use crate::db::RoadmapDb;
use crate::error::RoadmapError;

pub trait Directory: Send + Sync {
    /// Student profile of a user, Forbidden when the user has none
    fn student_for_user(&self, user_id: &str) -> Result<StudentProfile, RoadmapError>;

    /// Teacher profile of a user, Forbidden when the user has none
    fn teacher_for_user(&self, user_id: &str) -> Result<TeacherProfile, RoadmapError>;

    fn students(&self, ids: &[String]) -> Result<HashMap<String, StudentProfile>, RoadmapError>;

    fn teachers(&self, ids: &[String]) -> Result<HashMap<String, TeacherProfile>, RoadmapError>;

    fn target_role(&self, id: &str) -> Result<Option<TargetRole>, RoadmapError>;

    fn target_roles(&self, ids: &[String]) -> Result<HashMap<String, TargetRole>, RoadmapError>;
}

/// Directory backed by the local profile tables
pub struct DbDirectory {
    db: Arc<RoadmapDb>,
}

impl DbDirectory {
    pub fn new(db: Arc<RoadmapDb>) -> Self {
        Self { db }
    }
}

impl Directory for DbDirectory {
    fn student_for_user(&self, user_id: &str) -> Result<StudentProfile, RoadmapError> {
        self.db
            .with_conn(|conn| repo::student_by_user_id(conn, user_id))?
            .ok_or_else(|| {
                RoadmapError::Forbidden(format!("user {} has no student profile", user_id))
            })
    }

    fn teacher_for_user(&self, user_id: &str) -> Result<TeacherProfile, RoadmapError> {
        self.db
            .with_conn(|conn| repo::teacher_by_user_id(conn, user_id))?
            .ok_or_else(|| {
                RoadmapError::Forbidden(format!("user {} has no teacher profile", user_id))
            })
    }

    fn students(&self, ids: &[String]) -> Result<HashMap<String, StudentProfile>, RoadmapError> {
        let rows = self.db.with_conn(|conn| repo::students_by_ids(conn, ids))?;
        Ok(rows.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    fn teachers(&self, ids: &[String]) -> Result<HashMap<String, TeacherProfile>, RoadmapError> {
        let rows = self.db.with_conn(|conn| repo::teachers_by_ids(conn, ids))?;
        Ok(rows.into_iter().map(|p| (p.id.clone(), p)).collect())
    }

    fn target_role(&self, id: &str) -> Result<Option<TargetRole>, RoadmapError> {
        self.db.with_conn(|conn| repo::get_target_role(conn, id))
    }

    fn target_roles(&self, ids: &[String]) -> Result<HashMap<String, TargetRole>, RoadmapError> {
        let rows = self
            .db
            .with_conn(|conn| repo::target_roles_by_ids(conn, ids))?;
        Ok(rows.into_iter().map(|r| (r.id.clone(), r)).collect())
    }
}

/// Sorted, de-duplicated copy of `ids`
pub(crate) fn unique_ids<'a, I>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut out: Vec<String> = ids.into_iter().cloned().collect();
    out.sort();
    out.dedup();
    out
}
