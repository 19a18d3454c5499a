//! Presentation-side view of a phase, folded from its events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventKind, Phase};

/// State of a phase as seen by whoever consumes its events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase_id: Uuid,

    pub phase: Phase,

    pub state: PhaseState,

    pub started_at: DateTime<Utc>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Number of items the worker announced
    pub total: usize,

    /// Latest aggregate progress, 0.0..=1.0
    pub fraction: f64,

    /// Item most recently reported on
    pub current: Option<String>,

    /// `(item, reason)` for every failed item, in order
    pub failures: Vec<(String, String)>,
}

impl PhaseStatus {
    pub fn new(phase_id: Uuid, phase: Phase) -> Self {
        Self {
            phase_id,
            phase,
            state: PhaseState::Running,
            started_at: Utc::now(),
            completed_at: None,
            total: 0,
            fraction: 0.0,
            current: None,
            failures: Vec::new(),
        }
    }

    /// Reconstruct status from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first = events.first()?;
        let mut status = Self::new(first.phase_id, first.phase);
        status.started_at = first.timestamp;

        for event in events {
            status.apply_event(event);
        }

        Some(status)
    }

    /// Apply a single event
    pub fn apply_event(&mut self, event: &Event) {
        match &event.kind {
            EventKind::PhaseStarted { total } => {
                self.state = PhaseState::Running;
                self.started_at = event.timestamp;
                self.total = *total;
            }
            EventKind::Progress { fraction, current } => {
                // Late or duplicated events never move the bar backwards
                self.fraction = self.fraction.max(*fraction);
                self.current = Some(current.clone());
            }
            EventKind::ItemFailed { name, reason } => {
                self.failures.push((name.clone(), reason.clone()));
            }
            EventKind::DecisionRequested { .. } => {
                self.state = PhaseState::AwaitingDecision;
            }
            EventKind::RowUpdated { .. } | EventKind::RowsAppended { .. } => {
                self.state = PhaseState::Running;
            }
            EventKind::PhaseCompleted { .. } => {
                self.state = PhaseState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventKind::PhaseAborted { error } => {
                self.state = PhaseState::Aborted {
                    error: error.clone(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            PhaseState::Running | PhaseState::AwaitingDecision
        )
    }

    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    /// Progress as a 0-100 percentage
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }
}

/// Lifecycle of a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PhaseState {
    Running,

    /// Blocked on the caller's append decision
    AwaitingDecision,

    Completed,

    Aborted { error: String },
}
