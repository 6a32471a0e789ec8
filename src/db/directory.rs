//! Profile, career role and reviewer assignment queries

use diesel::prelude::*;

use super::diesel_schema::{roadmap_reviewers, student_profiles, target_roles, teacher_profiles};
use super::models::{
    current_timestamp, NewRoadmapReviewer, RoadmapReviewer, StudentProfile, TargetRole,
    TeacherProfile,
};
use crate::error::RoadmapError;

// ============================================================================
// Profiles
// ============================================================================

pub fn student_by_user_id(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<StudentProfile>, RoadmapError> {
    Ok(student_profiles::table
        .filter(student_profiles::user_id.eq(user_id))
        .first(conn)
        .optional()?)
}

pub fn teacher_by_user_id(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<TeacherProfile>, RoadmapError> {
    Ok(teacher_profiles::table
        .filter(teacher_profiles::user_id.eq(user_id))
        .first(conn)
        .optional()?)
}

pub fn students_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<StudentProfile>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(student_profiles::table
        .filter(student_profiles::id.eq_any(ids))
        .load(conn)?)
}

pub fn teachers_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<TeacherProfile>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(teacher_profiles::table
        .filter(teacher_profiles::id.eq_any(ids))
        .load(conn)?)
}

/// Insert or replace a student profile
pub fn upsert_student(
    conn: &mut SqliteConnection,
    profile: &StudentProfile,
) -> Result<(), RoadmapError> {
    diesel::replace_into(student_profiles::table)
        .values(profile)
        .execute(conn)?;
    Ok(())
}

/// Insert or replace a teacher profile
pub fn upsert_teacher(
    conn: &mut SqliteConnection,
    profile: &TeacherProfile,
) -> Result<(), RoadmapError> {
    diesel::replace_into(teacher_profiles::table)
        .values(profile)
        .execute(conn)?;
    Ok(())
}

// ============================================================================
// Target Roles
// ============================================================================

pub fn get_target_role(
    conn: &mut SqliteConnection,
    role_id: &str,
) -> Result<Option<TargetRole>, RoadmapError> {
    Ok(target_roles::table
        .filter(target_roles::id.eq(role_id))
        .first(conn)
        .optional()?)
}

pub fn target_roles_by_ids(
    conn: &mut SqliteConnection,
    ids: &[String],
) -> Result<Vec<TargetRole>, RoadmapError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    Ok(target_roles::table
        .filter(target_roles::id.eq_any(ids))
        .load(conn)?)
}

pub fn upsert_target_role(
    conn: &mut SqliteConnection,
    role: &TargetRole,
) -> Result<(), RoadmapError> {
    diesel::replace_into(target_roles::table)
        .values(role)
        .execute(conn)?;
    Ok(())
}

// ============================================================================
// Reviewer Assignments
// ============================================================================

/// Assign a teacher to review a roadmap; assigning twice is a no-op
pub fn assign_reviewer(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    teacher_profile_id: &str,
    assigned_by: Option<&str>,
) -> Result<RoadmapReviewer, RoadmapError> {
    let now = current_timestamp();
    diesel::insert_or_ignore_into(roadmap_reviewers::table)
        .values(&NewRoadmapReviewer {
            roadmap_id,
            teacher_profile_id,
            assigned_by,
            assigned_at: &now,
        })
        .execute(conn)?;

    Ok(roadmap_reviewers::table
        .find((roadmap_id, teacher_profile_id))
        .first(conn)?)
}

pub fn unassign_reviewer(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    teacher_profile_id: &str,
) -> Result<bool, RoadmapError> {
    let deleted = diesel::delete(roadmap_reviewers::table.find((roadmap_id, teacher_profile_id)))
        .execute(conn)?;
    Ok(deleted > 0)
}

pub fn is_reviewer(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
    teacher_profile_id: &str,
) -> Result<bool, RoadmapError> {
    let count: i64 = roadmap_reviewers::table
        .filter(roadmap_reviewers::roadmap_id.eq(roadmap_id))
        .filter(roadmap_reviewers::teacher_profile_id.eq(teacher_profile_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Roadmaps a teacher is assigned to review
pub fn reviewer_roadmap_ids(
    conn: &mut SqliteConnection,
    teacher_profile_id: &str,
) -> Result<Vec<String>, RoadmapError> {
    Ok(roadmap_reviewers::table
        .filter(roadmap_reviewers::teacher_profile_id.eq(teacher_profile_id))
        .select(roadmap_reviewers::roadmap_id)
        .load(conn)?)
}

pub fn list_reviewers(
    conn: &mut SqliteConnection,
    roadmap_id: &str,
) -> Result<Vec<RoadmapReviewer>, RoadmapError> {
    Ok(roadmap_reviewers::table
        .filter(roadmap_reviewers::roadmap_id.eq(roadmap_id))
        .order(roadmap_reviewers::assigned_at.asc())
        .load(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RoadmapDb;
    use diesel::connection::SimpleConnection;

    #[test]
    fn test_profile_lookup_by_user_id() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            upsert_student(
                conn,
                &StudentProfile {
                    id: "sp-1".into(),
                    user_id: "user-1".into(),
                    full_name: "Ada".into(),
                    email: "ada@example.com".into(),
                    recommended_role_id: Some("role-backend".into()),
                },
            )?;
            let found = student_by_user_id(conn, "user-1")?.unwrap();
            assert_eq!(found.id, "sp-1");
            assert!(student_by_user_id(conn, "user-2")?.is_none());
            assert!(teacher_by_user_id(conn, "user-1")?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reviewer_assignment_is_idempotent() {
        let db = RoadmapDb::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.batch_execute(
                "INSERT INTO roadmaps (id, target_role_id, name) VALUES ('r1', 'role-1', 'Backend')",
            )?;
            assign_reviewer(conn, "r1", "tp-1", Some("admin"))?;
            assign_reviewer(conn, "r1", "tp-1", None)?;

            let reviewers = list_reviewers(conn, "r1")?;
            assert_eq!(reviewers.len(), 1);
            assert_eq!(reviewers[0].assigned_by.as_deref(), Some("admin"));
            assert!(is_reviewer(conn, "r1", "tp-1")?);
            assert_eq!(reviewer_roadmap_ids(conn, "tp-1")?, vec!["r1".to_string()]);

            assert!(unassign_reviewer(conn, "r1", "tp-1")?);
            assert!(!unassign_reviewer(conn, "r1", "tp-1")?);
            assert!(!is_reviewer(conn, "r1", "tp-1")?);
            Ok(())
        })
        .unwrap();
    }
}
