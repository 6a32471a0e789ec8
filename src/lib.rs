//! Roadmap Progress - teacher-gated learning path progression
//!
//! Students work through an ordered roadmap of steps. Each step moves through
//! a small state machine (locked, unlocked, in progress, submitted, then
//! approved or rejected), and a teacher's approval unlocks the next step.
//!
//! ## Architecture
//!
//! - **progression**: pure state machine and percent math
//! - **db**: Diesel/SQLite repositories; every transition is a conditional
//!   update inside an immediate transaction
//! - **services**: role checks, validation, profile lookups and events
//! - **http**: hyper server mapping routes to service calls
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/roadmap-progress/
//! ├── roadmap.db      # SQLite database (WAL mode)
//! └── config.toml     # Configuration
//! ```

pub mod caller;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod pagination;
pub mod progression;
pub mod services;

// Re-exports
pub use caller::{Caller, Role};
pub use config::Config;
pub use db::RoadmapDb;
pub use error::RoadmapError;
pub use http::HttpServer;
pub use pagination::{PageRequest, Paginated};
pub use progression::{StepEvent, StepHints, StepStatus};
pub use services::Services;
