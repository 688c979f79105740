//! Domain events and the completion-side-effect observer.
//!
//! The engine does not own mail sending, cart clearing, or session
//! bookkeeping; those belong to surrounding collaborators. It notifies them
//! through [`CheckoutLifecycle`] (invoked synchronously on transitions) and
//! broadcasts [`Event`]s over an mpsc channel for anything else listening.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entities::order;

/// Events emitted by the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated { order_id: i64, session_id: String },
    PaymentConfirmed { order_id: i64 },
    PaymentRefunded { order_id: i64, refund_id: String },
    OrderCancelled { order_id: i64 },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel. Consumers that integrate with external systems
/// replace this loop; the default just records each event.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        info!(?event, "processing event");
    }
    info!("event channel closed; stopping event processor");
}

/// Completion side effects, delegated to the surrounding order workflow.
///
/// `payment_completed` fires exactly once per order, on the status
/// transition that applies the payment (confirmation mail, cart clear,
/// session bookkeeping). `resume_completed` fires when a redirect lands on
/// an order the webhook already settled: the customer still needs cart and
/// session cleanup, but no second mail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckoutLifecycle: Send + Sync {
    async fn payment_completed(&self, order: &order::Model);
    async fn resume_completed(&self, order: &order::Model);
}

/// Default observer: logs the side effects the deployment is expected to
/// wire up and emits nothing beyond the engine's own events.
pub struct LoggingLifecycle;

#[async_trait]
impl CheckoutLifecycle for LoggingLifecycle {
    async fn payment_completed(&self, order: &order::Model) {
        info!(
            order_id = order.id,
            email = %order.email,
            "payment completed: queueing confirmation mail, clearing cart"
        );
    }

    async fn resume_completed(&self, order: &order::Model) {
        warn!(
            order_id = order.id,
            "redirect landed on an already-settled order: clearing cart only"
        );
    }
}
