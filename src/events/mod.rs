//! Outbound kernel events for external collaborators.
//!
//! The hub fans events out to every subscriber over unbounded channels;
//! disconnected subscribers are pruned on the next publish. Only
//! supervision outcomes cross this boundary: per-task errors stay
//! synchronous and module-internal.

use crate::types::ModuleId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Events surfaced to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    /// A module's health score fell below the degraded threshold.
    ModuleDegraded { module_id: ModuleId, score: u32 },

    /// A module exhausted its recovery attempts and is permanently failed.
    /// The only failure that is collaborator-visible by design.
    ModuleUnrecoverable { module_id: ModuleId },

    /// The decision engine requested backup activation for a module.
    BackupRequested { module_id: ModuleId },
}

/// Fan-out hub for kernel events.
#[derive(Debug, Default)]
pub struct EventHub {
    subscribers: Arc<RwLock<Vec<mpsc::UnboundedSender<KernelEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all kernel events.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<KernelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.push(tx);
        rx
    }

    /// Publish an event to all live subscribers; returns the delivered
    /// count. Closed subscriber channels are dropped here.
    pub async fn publish(&self, event: KernelEvent) -> usize {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|tx| !tx.is_closed());

        let mut delivered = 0;
        for tx in subscribers.iter() {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(?event, delivered, "kernel event published");
        delivered
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_to_zero_subscribers() {
        let hub = EventHub::new();
        let delivered = hub
            .publish(KernelEvent::ModuleUnrecoverable {
                module_id: ModuleId::new(),
            })
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let hub = EventHub::new();
        let mut rx1 = hub.subscribe().await;
        let mut rx2 = hub.subscribe().await;

        let id = ModuleId::new();
        let delivered = hub
            .publish(KernelEvent::ModuleDegraded {
                module_id: id.clone(),
                score: 42,
            })
            .await;
        assert_eq!(delivered, 2);

        let event = rx1.recv().await.unwrap();
        assert_eq!(
            event,
            KernelEvent::ModuleDegraded {
                module_id: id.clone(),
                score: 42
            }
        );
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_pruned() {
        let hub = EventHub::new();
        let rx = hub.subscribe().await;
        drop(rx);

        let delivered = hub
            .publish(KernelEvent::BackupRequested {
                module_id: ModuleId::new(),
            })
            .await;
        assert_eq!(delivered, 0);
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
