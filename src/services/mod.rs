//! Service layer for roadmap-progress
//!
//! Services hold the business rules between HTTP handlers and repositories:
//! - Role checks on the explicit `Caller`
//! - Input validation
//! - Profile and career-role lookups through the `Directory`
//! - Event emission after the owning transaction commits
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod catalog_service;
pub mod directory;
pub mod events;
pub mod progress_service;
pub mod response;
pub mod review_service;

pub use catalog_service::CatalogService;
pub use directory::{DbDirectory, Directory};
pub use events::{EventBus, EventListener, RoadmapEvent};
pub use progress_service::ProgressService;
pub use review_service::ReviewService;

use std::sync::Arc;

use crate::db::RoadmapDb;

/// Service container handed to the HTTP server
pub struct Services {
    pub db: Arc<RoadmapDb>,
    pub catalog: Arc<CatalogService>,
    pub progress: Arc<ProgressService>,
    pub review: Arc<ReviewService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services over the local profile tables
    pub fn new(db: Arc<RoadmapDb>, strict_review_scoping: bool) -> Self {
        let directory: Arc<dyn Directory> = Arc::new(DbDirectory::new(db.clone()));
        Self::with_directory(db, directory, strict_review_scoping)
    }

    /// Create all services with a custom profile directory
    pub fn with_directory(
        db: Arc<RoadmapDb>,
        directory: Arc<dyn Directory>,
        strict_review_scoping: bool,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            catalog: Arc::new(CatalogService::new(
                db.clone(),
                directory.clone(),
                events.clone(),
            )),
            progress: Arc::new(ProgressService::new(
                db.clone(),
                directory.clone(),
                events.clone(),
            )),
            review: Arc::new(ReviewService::new(
                db.clone(),
                directory,
                events.clone(),
                strict_review_scoping,
            )),
            db,
            events,
        }
    }
}
