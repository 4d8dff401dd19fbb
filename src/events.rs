use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Domain events emitted after a successful commit. Publication is
/// fire-and-forget: a failed publish never rolls back the write it reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    EnrollmentCreated {
        course_id: i64,
        student_id: i64,
        actor: Option<i64>,
    },
    UsersAssigned {
        course_id: i64,
        student_ids: Vec<i64>,
        actor: Option<i64>,
    },
    GroupEnrolled {
        course_id: i64,
        group_id: i64,
        actor: Option<i64>,
    },
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Hands events to an outbound queue; a dropped receiver only logs.
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<DomainEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DomainEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("event receiver gone, dropping event: {:?}", e.0);
        }
    }
}

pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: DomainEvent) {}
}

/// Test publisher that records everything it is handed.
#[derive(Default)]
pub struct RecordingPublisher {
    events: parking_lot::Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}
