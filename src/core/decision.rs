//! The append decision for unmatched uploads.
//!
//! Reconciliation suspends on `UnmatchedDecider::decide` until the caller
//! answers. `ChannelDecider` turns that into a request/response exchange with
//! whatever presentation layer holds the receiving end.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Decides whether unmatched items become new rows
#[async_trait]
pub trait UnmatchedDecider: Send + Sync {
    /// `names` are the original file names of the unmatched items, in scan order
    async fn decide(&self, names: &[String]) -> bool;
}

/// Always gives the same answer (non-interactive runs)
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub bool);

#[async_trait]
impl UnmatchedDecider for FixedDecision {
    async fn decide(&self, _names: &[String]) -> bool {
        self.0
    }
}

/// A pending decision; resolving it consumes the request
#[derive(Debug)]
pub struct DecisionRequest {
    names: Vec<String>,
    respond_to: oneshot::Sender<bool>,
}

impl DecisionRequest {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Answer the request. `true` appends the unmatched items as new rows.
    pub fn resolve(self, create_rows: bool) {
        // The worker may already be gone; nothing to report then
        let _ = self.respond_to.send(create_rows);
    }
}

/// Forwards each decision to a channel and waits for the answer
#[derive(Debug, Clone)]
pub struct ChannelDecider {
    requests: mpsc::Sender<DecisionRequest>,
}

impl ChannelDecider {
    /// Create a decider and the receiver the presentation layer answers on
    pub fn channel() -> (Self, mpsc::Receiver<DecisionRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { requests: tx }, rx)
    }
}

#[async_trait]
impl UnmatchedDecider for ChannelDecider {
    async fn decide(&self, names: &[String]) -> bool {
        let (tx, rx) = oneshot::channel();
        let request = DecisionRequest {
            names: names.to_vec(),
            respond_to: tx,
        };

        if self.requests.send(request).await.is_err() {
            warn!("Decision channel closed, not appending unmatched items");
            return false;
        }

        match rx.await {
            Ok(create_rows) => create_rows,
            Err(_) => {
                warn!("Decision request dropped unanswered, not appending unmatched items");
                false
            }
        }
    }
}
