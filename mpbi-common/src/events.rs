//! Generation events and the broadcast bus that carries them
//!
//! Events are emitted by the batch executor and file management operations
//! and forwarded to browser clients over SSE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events describing invoice generation activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GenerationEvent {
    /// A run was created and its transaction queue persisted
    RunStarted {
        job_id: Uuid,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// One batch finished and more transactions remain
    BatchAdvanced {
        job_id: Uuid,
        processed: usize,
        successful: usize,
        remaining: usize,
        total: usize,
    },

    /// The last batch finished; the job row has been removed
    RunCompleted {
        job_id: Uuid,
        processed: usize,
        successful: usize,
        error_count: usize,
        packaging_requested: bool,
    },

    /// A ZIP archive was written to the output directory
    ArchiveCreated { filename: String, file_count: usize },

    /// Output files were removed by an operator
    FilesDeleted { deleted: usize },
}

impl GenerationEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            GenerationEvent::RunStarted { .. } => "RunStarted",
            GenerationEvent::BatchAdvanced { .. } => "BatchAdvanced",
            GenerationEvent::RunCompleted { .. } => "RunCompleted",
            GenerationEvent::ArchiveCreated { .. } => "ArchiveCreated",
            GenerationEvent::FilesDeleted { .. } => "FilesDeleted",
        }
    }
}

/// Broadcast bus for generation events
///
/// Slow subscribers lag and drop events rather than blocking the executor.
///
/// # Examples
///
/// ```
/// use mpbi_common::events::{EventBus, GenerationEvent};
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(GenerationEvent::FilesDeleted { deleted: 3 });
/// assert_eq!(rx.try_recv().unwrap().event_type(), "FilesDeleted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GenerationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: GenerationEvent,
    ) -> Result<usize, broadcast::error::SendError<GenerationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: GenerationEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
