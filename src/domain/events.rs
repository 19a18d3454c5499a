//! Events emitted by a running phase.
//!
//! Workers never share live state with the presentation layer. Everything the
//! caller learns about a running phase arrives as an `Event` on a channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event emitted by a phase worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred
    pub timestamp: DateTime<Utc>,

    /// The phase run this event belongs to
    pub phase_id: Uuid,

    pub phase: Phase,

    pub kind: EventKind,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(phase_id: Uuid, phase: Phase, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            phase_id,
            phase,
            kind,
        }
    }
}

/// The two sequential stages of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Source files to artifacts
    Conversion,

    /// Upload and reconciliation
    Publish,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Conversion => write!(f, "conversion"),
            Phase::Publish => write!(f, "publish"),
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventKind {
    /// The worker started processing `total` items
    PhaseStarted { total: usize },

    /// Aggregate progress in 0.0..=1.0 and the item it refers to
    Progress { fraction: f64, current: String },

    /// One item failed; the batch continues
    ItemFailed { name: String, reason: String },

    /// Unmatched items are waiting for an append decision
    DecisionRequested { names: Vec<String> },

    /// The link column of an existing row was filled
    RowUpdated { row: u32, name: String },

    /// Unmatched items were written as new rows
    RowsAppended { start_row: u32, count: usize },

    /// The phase ran to the end
    PhaseCompleted { succeeded: usize, failed: usize },

    /// The phase stopped early
    PhaseAborted { error: String },
}
