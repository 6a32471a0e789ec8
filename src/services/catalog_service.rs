//! Catalog service - admin operations on roadmaps, steps and reviewers
//!
//! Wraps the catalog repository with role checks, validation and event
//! emission. Contiguous ordering and the progress guards on structural edits
//! live in the repository transactions.

use std::sync::Arc;

use tracing::info;

use crate::caller::{Caller, Role};
use crate::db::models::{
    difficulty_levels, generation_sources, roadmap_status, visibility, Roadmap, RoadmapReviewer,
    RoadmapStep,
};
use crate::db::roadmaps::{
    self, CreateRoadmapInput, CreateStepInput, RoadmapQuery, RoadmapWithSteps, UpdateRoadmapInput,
    UpdateStepInput,
};
use crate::db::{directory as directory_repo, RoadmapDb};
use crate::error::RoadmapError;
use crate::pagination::{PageRequest, Paginated};

use super::directory::Directory;
use super::events::{EventBus, RoadmapEvent};

const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;

pub struct CatalogService {
    db: Arc<RoadmapDb>,
    directory: Arc<dyn Directory>,
    events: Arc<EventBus>,
}

impl CatalogService {
    pub fn new(db: Arc<RoadmapDb>, directory: Arc<dyn Directory>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            directory,
            events,
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    pub fn list(
        &self,
        caller: &Caller,
        query: &RoadmapQuery,
        page: PageRequest,
    ) -> Result<Paginated<Roadmap>, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let (items, total) = self.db.with_conn(|conn| {
            let items = roadmaps::list_roadmaps(conn, query, page.limit, page.offset())?;
            let total = roadmaps::count_roadmaps(conn, query)?;
            Ok((items, total))
        })?;
        Ok(Paginated::new(items, total, page))
    }

    pub fn get(&self, caller: &Caller, roadmap_id: &str) -> Result<RoadmapWithSteps, RoadmapError> {
        caller.require(&[Role::Admin])?;
        self.db
            .with_conn(|conn| roadmaps::get_roadmap_with_steps(conn, roadmap_id))?
            .ok_or_else(|| RoadmapError::NotFound(format!("roadmap {}", roadmap_id)))
    }

    // =========================================================================
    // Roadmap Operations
    // =========================================================================

    /// Create a roadmap in `draft`
    pub fn create(
        &self,
        caller: &Caller,
        input: CreateRoadmapInput,
    ) -> Result<Roadmap, RoadmapError> {
        caller.require(&[Role::Admin])?;
        self.validate_roadmap(&input)?;

        if self.directory.target_role(&input.target_role_id)?.is_none() {
            return Err(RoadmapError::InvalidInput(format!(
                "targetRoleId '{}' does not exist",
                input.target_role_id
            )));
        }

        let roadmap = self
            .db
            .with_conn(|conn| roadmaps::create_roadmap(conn, &input, Some(&caller.user_id)))?;

        info!(id = %roadmap.id, name = %roadmap.name, "Roadmap created");
        self.events.emit(RoadmapEvent::RoadmapCreated {
            id: roadmap.id.clone(),
            name: roadmap.name.clone(),
        });

        Ok(roadmap)
    }

    /// Update name, description, visibility or lifecycle status
    pub fn update(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        input: UpdateRoadmapInput,
    ) -> Result<Roadmap, RoadmapError> {
        caller.require(&[Role::Admin])?;
        if let Some(ref name) = input.name {
            validate_name("name", name)?;
        }
        if let Some(ref description) = input.description {
            validate_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(ref value) = input.visibility {
            validate_choice("visibility", value, &visibility::ALL)?;
        }
        if let Some(ref status) = input.status {
            validate_choice("status", status, &roadmap_status::ALL)?;
        }

        let roadmap = self.db.with_conn(|conn| {
            conn.immediate_transaction(|conn| {
                let current = roadmaps::require_roadmap(conn, roadmap_id)?;

                if let Some(ref status) = input.status {
                    if !roadmap_status::can_transition(&current.status, status) {
                        return Err(RoadmapError::PreconditionFailed(format!(
                            "roadmap cannot move from '{}' to '{}'",
                            current.status, status
                        )));
                    }
                    if status == roadmap_status::ACTIVE
                        && roadmaps::step_count(conn, roadmap_id)? == 0
                    {
                        return Err(RoadmapError::PreconditionFailed(
                            "a roadmap needs at least one step to be active".into(),
                        ));
                    }
                }

                roadmaps::update_roadmap(conn, roadmap_id, &input)
            })
        })?;

        self.events.emit(RoadmapEvent::RoadmapUpdated {
            id: roadmap.id.clone(),
            status: roadmap.status.clone(),
        });

        Ok(roadmap)
    }

    /// Delete a roadmap; student progress blocks it unless `cascade` is set
    pub fn delete(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        cascade: bool,
    ) -> Result<bool, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let deleted = self
            .db
            .with_conn(|conn| roadmaps::delete_roadmap(conn, roadmap_id, cascade))?;

        if deleted {
            info!(id = %roadmap_id, cascade, "Roadmap deleted");
            self.events.emit(RoadmapEvent::RoadmapDeleted {
                id: roadmap_id.to_string(),
            });
        }

        Ok(deleted)
    }

    // =========================================================================
    // Step Operations
    // =========================================================================

    pub fn add_step(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        input: CreateStepInput,
    ) -> Result<RoadmapStep, RoadmapError> {
        caller.require(&[Role::Admin])?;
        self.validate_step(&input)?;

        let step = self
            .db
            .with_conn(|conn| roadmaps::insert_step(conn, roadmap_id, &input))?;

        self.events.emit(RoadmapEvent::StepsChanged {
            roadmap_id: roadmap_id.to_string(),
        });
        Ok(step)
    }

    /// Edit a step's content; allowed even after students started the roadmap
    pub fn update_step(
        &self,
        caller: &Caller,
        step_id: &str,
        input: UpdateStepInput,
    ) -> Result<RoadmapStep, RoadmapError> {
        caller.require(&[Role::Admin])?;
        if let Some(ref title) = input.title {
            validate_name("title", title)?;
        }
        if let Some(hours) = input.estimated_duration_hours {
            validate_duration(hours)?;
        }
        if let Some(ref level) = input.difficulty_level {
            validate_choice("difficultyLevel", level, &difficulty_levels::ALL)?;
        }
        if let Some(ref links) = input.resource_links {
            validate_links(links)?;
        }

        self.db
            .with_conn(|conn| roadmaps::update_step(conn, step_id, &input))
    }

    pub fn delete_step(&self, caller: &Caller, step_id: &str) -> Result<bool, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let removed = self.db.with_conn(|conn| {
            let step = roadmaps::get_step(conn, step_id)?;
            let deleted = roadmaps::delete_step(conn, step_id)?;
            Ok(step.filter(|_| deleted).map(|s| s.roadmap_id))
        })?;

        match removed {
            Some(roadmap_id) => {
                self.events.emit(RoadmapEvent::StepsChanged { roadmap_id });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn reorder_steps(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        step_ids: &[String],
    ) -> Result<Vec<RoadmapStep>, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let steps = self
            .db
            .with_conn(|conn| roadmaps::reorder_steps(conn, roadmap_id, step_ids))?;

        self.events.emit(RoadmapEvent::StepsChanged {
            roadmap_id: roadmap_id.to_string(),
        });
        Ok(steps)
    }

    // =========================================================================
    // Reviewer Assignment
    // =========================================================================

    pub fn assign_reviewer(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        teacher_profile_id: &str,
    ) -> Result<RoadmapReviewer, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let ids = [teacher_profile_id.to_string()];
        if self.directory.teachers(&ids)?.is_empty() {
            return Err(RoadmapError::NotFound(format!(
                "teacher profile {}",
                teacher_profile_id
            )));
        }

        let reviewer = self.db.with_conn(|conn| {
            roadmaps::require_roadmap(conn, roadmap_id)?;
            directory_repo::assign_reviewer(
                conn,
                roadmap_id,
                teacher_profile_id,
                Some(&caller.user_id),
            )
        })?;

        self.events.emit(RoadmapEvent::ReviewerAssigned {
            roadmap_id: roadmap_id.to_string(),
            teacher_profile_id: teacher_profile_id.to_string(),
        });
        Ok(reviewer)
    }

    pub fn unassign_reviewer(
        &self,
        caller: &Caller,
        roadmap_id: &str,
        teacher_profile_id: &str,
    ) -> Result<bool, RoadmapError> {
        caller.require(&[Role::Admin])?;
        let removed = self.db.with_conn(|conn| {
            directory_repo::unassign_reviewer(conn, roadmap_id, teacher_profile_id)
        })?;

        if removed {
            self.events.emit(RoadmapEvent::ReviewerUnassigned {
                roadmap_id: roadmap_id.to_string(),
                teacher_profile_id: teacher_profile_id.to_string(),
            });
        }
        Ok(removed)
    }

    pub fn reviewers(
        &self,
        caller: &Caller,
        roadmap_id: &str,
    ) -> Result<Vec<RoadmapReviewer>, RoadmapError> {
        caller.require(&[Role::Admin])?;
        self.db.with_conn(|conn| {
            roadmaps::require_roadmap(conn, roadmap_id)?;
            directory_repo::list_reviewers(conn, roadmap_id)
        })
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_roadmap(&self, input: &CreateRoadmapInput) -> Result<(), RoadmapError> {
        validate_name("name", &input.name)?;
        if input.target_role_id.trim().is_empty() {
            return Err(RoadmapError::InvalidInput("targetRoleId is required".into()));
        }
        if let Some(ref description) = input.description {
            validate_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        validate_choice("visibility", &input.visibility, &visibility::ALL)?;
        validate_choice(
            "generationSource",
            &input.generation_source,
            &generation_sources::ALL,
        )?;
        if let Some(ref metadata) = input.generation_metadata_json {
            serde_json::from_str::<serde_json::Value>(metadata).map_err(|e| {
                RoadmapError::InvalidInput(format!("generationMetadataJson is not valid JSON: {}", e))
            })?;
        }
        Ok(())
    }

    fn validate_step(&self, input: &CreateStepInput) -> Result<(), RoadmapError> {
        validate_name("title", &input.title)?;
        validate_len("description", &input.description, MAX_DESCRIPTION_LEN)?;
        validate_duration(input.estimated_duration_hours)?;
        validate_choice(
            "difficultyLevel",
            &input.difficulty_level,
            &difficulty_levels::ALL,
        )?;
        validate_links(&input.resource_links)
    }
}

fn validate_name(field: &str, value: &str) -> Result<(), RoadmapError> {
    if value.trim().is_empty() {
        return Err(RoadmapError::InvalidInput(format!("{} is required", field)));
    }
    validate_len(field, value, MAX_NAME_LEN)
}

fn validate_len(field: &str, value: &str, max: usize) -> Result<(), RoadmapError> {
    if value.chars().count() > max {
        return Err(RoadmapError::InvalidInput(format!(
            "{} must be <= {} characters",
            field, max
        )));
    }
    Ok(())
}

fn validate_choice(field: &str, value: &str, valid: &[&str]) -> Result<(), RoadmapError> {
    if !valid.contains(&value) {
        return Err(RoadmapError::InvalidInput(format!(
            "{} '{}' is not valid. Valid values: {:?}",
            field, value, valid
        )));
    }
    Ok(())
}

fn validate_duration(hours: i32) -> Result<(), RoadmapError> {
    if hours <= 0 {
        return Err(RoadmapError::InvalidInput(
            "estimatedDurationHours must be > 0".into(),
        ));
    }
    Ok(())
}

fn validate_links(links: &[String]) -> Result<(), RoadmapError> {
    if links.iter().any(|l| l.trim().is_empty()) {
        return Err(RoadmapError::InvalidInput(
            "resourceLinks must not contain empty entries".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::TargetRole;
    use crate::services::directory::DbDirectory;

    fn service() -> (CatalogService, Arc<RoadmapDb>) {
        let db = Arc::new(RoadmapDb::open_in_memory().unwrap());
        db.with_conn(|conn| {
            directory_repo::upsert_target_role(
                conn,
                &TargetRole {
                    id: "role-backend".into(),
                    name: "Backend Engineer".into(),
                    description: None,
                },
            )
        })
        .unwrap();
        let directory = Arc::new(DbDirectory::new(db.clone()));
        let service = CatalogService::new(db.clone(), directory, Arc::new(EventBus::new()));
        (service, db)
    }

    fn roadmap_input() -> CreateRoadmapInput {
        serde_json::from_value(serde_json::json!({
            "targetRoleId": "role-backend",
            "name": "Backend Track"
        }))
        .unwrap()
    }

    fn step_input(title: &str) -> CreateStepInput {
        serde_json::from_value(serde_json::json!({
            "title": title,
            "estimatedDurationHours": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_create_requires_admin_and_known_role() {
        let (service, _) = service();
        let result = service.create(&Caller::student("u-1"), roadmap_input());
        assert!(matches!(result, Err(RoadmapError::Forbidden(_))));

        let mut input = roadmap_input();
        input.target_role_id = "role-unknown".into();
        let result = service.create(&Caller::admin("a-1"), input);
        assert!(matches!(result, Err(RoadmapError::InvalidInput(_))));

        let roadmap = service.create(&Caller::admin("a-1"), roadmap_input()).unwrap();
        assert_eq!(roadmap.status, roadmap_status::DRAFT);
        assert_eq!(roadmap.visibility, visibility::SCHOOL);
    }

    #[test]
    fn test_create_validates_metadata_json() {
        let (service, _) = service();
        let mut input = roadmap_input();
        input.generation_source = generation_sources::AI.into();
        input.generation_metadata_json = Some("{not json".into());
        let result = service.create(&Caller::admin("a-1"), input);
        assert!(matches!(result, Err(RoadmapError::InvalidInput(_))));
    }

    #[test]
    fn test_activation_needs_steps() {
        let (service, _) = service();
        let admin = Caller::admin("a-1");
        let roadmap = service.create(&admin, roadmap_input()).unwrap();

        let activate = UpdateRoadmapInput {
            status: Some(roadmap_status::ACTIVE.into()),
            ..Default::default()
        };
        let result = service.update(&admin, &roadmap.id, activate.clone());
        assert!(matches!(result, Err(RoadmapError::PreconditionFailed(_))));

        service.add_step(&admin, &roadmap.id, step_input("Intro")).unwrap();
        let active = service.update(&admin, &roadmap.id, activate).unwrap();
        assert_eq!(active.status, roadmap_status::ACTIVE);

        let back_to_draft = UpdateRoadmapInput {
            status: Some(roadmap_status::DRAFT.into()),
            ..Default::default()
        };
        let result = service.update(&admin, &roadmap.id, back_to_draft);
        assert!(matches!(result, Err(RoadmapError::PreconditionFailed(_))));
    }

    #[test]
    fn test_step_validation() {
        let (service, _) = service();
        let admin = Caller::admin("a-1");
        let roadmap = service.create(&admin, roadmap_input()).unwrap();

        let mut bad = step_input("Intro");
        bad.estimated_duration_hours = 0;
        assert!(matches!(
            service.add_step(&admin, &roadmap.id, bad),
            Err(RoadmapError::InvalidInput(_))
        ));

        let mut bad = step_input("Intro");
        bad.difficulty_level = "expert".into();
        assert!(matches!(
            service.add_step(&admin, &roadmap.id, bad),
            Err(RoadmapError::InvalidInput(_))
        ));

        assert!(matches!(
            service.add_step(&admin, "missing", step_input("Intro")),
            Err(RoadmapError::NotFound(_))
        ));
    }

    #[test]
    fn test_assign_reviewer_requires_teacher_profile() {
        let (service, db) = service();
        let admin = Caller::admin("a-1");
        let roadmap = service.create(&admin, roadmap_input()).unwrap();

        assert!(matches!(
            service.assign_reviewer(&admin, &roadmap.id, "tp-1"),
            Err(RoadmapError::NotFound(_))
        ));

        db.with_conn(|conn| {
            directory_repo::upsert_teacher(
                conn,
                &crate::db::models::TeacherProfile {
                    id: "tp-1".into(),
                    user_id: "teacher-user".into(),
                    full_name: "Grace".into(),
                    email: "grace@example.com".into(),
                },
            )
        })
        .unwrap();

        let reviewer = service.assign_reviewer(&admin, &roadmap.id, "tp-1").unwrap();
        assert_eq!(reviewer.assigned_by.as_deref(), Some("a-1"));
        assert_eq!(service.reviewers(&admin, &roadmap.id).unwrap().len(), 1);

        let mut events = service.events.subscribe();
        assert!(service.unassign_reviewer(&admin, &roadmap.id, "tp-1").unwrap());
        assert!(!service.unassign_reviewer(&admin, &roadmap.id, "tp-1").unwrap());
        assert!(service.reviewers(&admin, &roadmap.id).unwrap().is_empty());

        match events.try_recv() {
            Ok(RoadmapEvent::ReviewerUnassigned {
                roadmap_id,
                teacher_profile_id,
            }) => {
                assert_eq!(roadmap_id, roadmap.id);
                assert_eq!(teacher_profile_id, "tp-1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        // nothing removed, nothing emitted
        assert!(events.try_recv().is_err());
    }
}
