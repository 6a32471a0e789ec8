//! Event bus for progression and catalog changes
//!
//! Events are emitted after the transaction that caused them commits, so a
//! listener never observes a change that was rolled back.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Events emitted by the services
#[derive(Debug, Clone)]
pub enum RoadmapEvent {
    // Catalog events
    RoadmapCreated {
        id: String,
        name: String,
    },
    RoadmapUpdated {
        id: String,
        status: String,
    },
    RoadmapDeleted {
        id: String,
    },
    StepsChanged {
        roadmap_id: String,
    },
    ReviewerAssigned {
        roadmap_id: String,
        teacher_profile_id: String,
    },
    ReviewerUnassigned {
        roadmap_id: String,
        teacher_profile_id: String,
    },

    // Progression events
    RoadmapStarted {
        progress_id: String,
        roadmap_id: String,
        student_profile_id: String,
    },
    StepStarted {
        step_progress_id: String,
    },
    EvidenceSubmitted {
        step_progress_id: String,
        evidence_link: String,
    },
    SubmissionApproved {
        step_progress_id: String,
        teacher_profile_id: String,
        unlocked_step_progress_id: Option<String>,
    },
    SubmissionRejected {
        step_progress_id: String,
        teacher_profile_id: String,
    },
    RoadmapCompleted {
        progress_id: String,
        roadmap_id: String,
        student_profile_id: String,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &RoadmapEvent);
}

/// Broadcast channel for roadmap events
pub struct EventBus {
    sender: broadcast::Sender<RoadmapEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: RoadmapEvent) {
        trace!(event = ?event, "Emitting roadmap event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoadmapEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit trail via tracing
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &RoadmapEvent) {
        match event {
            RoadmapEvent::RoadmapStarted {
                roadmap_id,
                student_profile_id,
                ..
            } => {
                info!(roadmap = %roadmap_id, student = %student_profile_id, "Roadmap started");
            }
            RoadmapEvent::EvidenceSubmitted {
                step_progress_id, ..
            } => {
                debug!(step_progress = %step_progress_id, "Evidence submitted");
            }
            RoadmapEvent::SubmissionApproved {
                step_progress_id,
                teacher_profile_id,
                unlocked_step_progress_id,
            } => {
                info!(
                    step_progress = %step_progress_id,
                    teacher = %teacher_profile_id,
                    unlocked = ?unlocked_step_progress_id,
                    "Submission approved"
                );
            }
            RoadmapEvent::SubmissionRejected {
                step_progress_id,
                teacher_profile_id,
            } => {
                info!(
                    step_progress = %step_progress_id,
                    teacher = %teacher_profile_id,
                    "Submission rejected"
                );
            }
            RoadmapEvent::RoadmapCompleted {
                roadmap_id,
                student_profile_id,
                ..
            } => {
                info!(roadmap = %roadmap_id, student = %student_profile_id, "Roadmap completed");
            }
            _ => {
                trace!(event = ?event, "Roadmap event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(RoadmapEvent::SubmissionApproved {
            step_progress_id: "sp-1".into(),
            teacher_profile_id: "tp-1".into(),
            unlocked_step_progress_id: Some("sp-2".into()),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            RoadmapEvent::SubmissionApproved {
                step_progress_id,
                unlocked_step_progress_id,
                ..
            } => {
                assert_eq!(step_progress_id, "sp-1");
                assert_eq!(unlocked_step_progress_id.as_deref(), Some("sp-2"));
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        bus.emit(RoadmapEvent::RoadmapDeleted { id: "r1".into() });
    }
}
