//! Lifecycle notifications
//!
//! Components emit [`LifecycleEvent`]s to an injected [`EventSink`]. The
//! bundled [`ChannelEventSink`] forwards them over a `tokio::sync::mpsc`
//! channel; any other bus can be plugged in by implementing the trait.
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_core::events::{event_channel, ChannelEventSink};
//!
//! let (tx, mut rx) = event_channel(100);
//! let sink = Arc::new(ChannelEventSink::new(tx));
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         println!("{} at {}", event.event_type(), event.timestamp());
//!     }
//! });
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::security::PermissionLevel;

/// Events emitted by the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A token was issued
    PermissionGranted {
        agent_id: String,
        tool_id: String,
        level: PermissionLevel,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A call or grant was refused
    PermissionDenied {
        agent_id: String,
        tool_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A token was revoked
    TokenRevoked {
        agent_id: String,
        tool_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool invocation finished
    ToolCompleted {
        agent_id: String,
        tool_id: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A DAG node was not executed
    NodeSkipped {
        node: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Capital was locked into a budget
    BudgetIssued {
        agent_id: String,
        amount: f64,
        timestamp: DateTime<Utc>,
    },

    /// A budget was settled against the ledger
    BudgetSettled {
        agent_id: String,
        remaining: f64,
        returned: f64,
        timestamp: DateTime<Utc>,
    },

    /// A paid override was granted
    BypassPurchased {
        agent_id: String,
        tool_id: String,
        cost: f64,
        timestamp: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::PermissionGranted { .. } => "permission_granted",
            LifecycleEvent::PermissionDenied { .. } => "permission_denied",
            LifecycleEvent::TokenRevoked { .. } => "token_revoked",
            LifecycleEvent::ToolCompleted { .. } => "tool_completed",
            LifecycleEvent::NodeSkipped { .. } => "node_skipped",
            LifecycleEvent::BudgetIssued { .. } => "budget_issued",
            LifecycleEvent::BudgetSettled { .. } => "budget_settled",
            LifecycleEvent::BypassPurchased { .. } => "bypass_purchased",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::PermissionGranted { timestamp, .. }
            | LifecycleEvent::PermissionDenied { timestamp, .. }
            | LifecycleEvent::TokenRevoked { timestamp, .. }
            | LifecycleEvent::ToolCompleted { timestamp, .. }
            | LifecycleEvent::NodeSkipped { timestamp, .. }
            | LifecycleEvent::BudgetIssued { timestamp, .. }
            | LifecycleEvent::BudgetSettled { timestamp, .. }
            | LifecycleEvent::BypassPurchased { timestamp, .. } => *timestamp,
        }
    }
}

/// Receiver of lifecycle notifications
///
/// Emission is best effort: a slow or closed bus never fails or stalls the
/// operation that produced the event.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: LifecycleEvent);

    /// Non-async emission for contexts that cannot await (e.g. `Drop`)
    fn try_emit(&self, event: LifecycleEvent);
}

/// Sender half of an event channel
pub type EventSender = mpsc::Sender<LifecycleEvent>;

/// Receiver half of an event channel
pub type EventReceiver = mpsc::Receiver<LifecycleEvent>;

/// Creates a bounded event channel
pub fn event_channel(buffer_size: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer_size)
}

/// Event sink backed by an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: EventSender,
}

impl ChannelEventSink {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    /// Never waits: a full or closed channel drops the event
    async fn emit(&self, event: LifecycleEvent) {
        self.try_emit(event);
    }

    fn try_emit(&self, event: LifecycleEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(event = event.event_type(), "Lifecycle event dropped: channel full");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(event = event.event_type(), "Lifecycle event dropped: receiver closed");
            }
        }
    }
}
