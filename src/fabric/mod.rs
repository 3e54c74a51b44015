//! Communication fabric for point-to-point inter-module messaging.
//!
//! Every ordered (from, to) module pair gets its own bounded FIFO queue,
//! created lazily on first send rather than eagerly for every pair. Sends
//! fail fast: an unregistered peer is `UnknownDestination`, a full queue is
//! `ChannelFull`. Backpressure surfaces to the caller instead of silently
//! dropping messages.

use crate::types::{Error, ModuleId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A message in flight between two modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub kind: String,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            sent_at: Utc::now(),
        }
    }
}

/// Statistics about fabric usage.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FabricStats {
    pub messages_sent: u64,
    pub messages_drained: u64,
    pub channel_count: usize,
    pub attached_endpoints: usize,
}

/// In-memory message fabric keyed by ordered module pairs.
#[derive(Debug)]
pub struct Fabric {
    /// Bounded queue capacity per channel.
    capacity: usize,

    /// Endpoints currently eligible to send or receive.
    endpoints: Arc<RwLock<HashSet<ModuleId>>>,

    /// Directed channels: (from, to) -> pending messages.
    channels: Arc<RwLock<HashMap<(ModuleId, ModuleId), VecDeque<Message>>>>,

    /// Statistics
    stats: Arc<RwLock<FabricStats>>,
}

impl Fabric {
    /// Create a new fabric with the given per-channel capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            endpoints: Arc::new(RwLock::new(HashSet::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(FabricStats::default())),
        }
    }

    /// Attach an endpoint. Called when a module registers.
    pub async fn attach(&self, module_id: ModuleId) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.insert(module_id);

        let mut stats = self.stats.write().await;
        stats.attached_endpoints = endpoints.len();
    }

    /// Detach an endpoint and drop every channel touching it. Called when a
    /// module unregisters; pending messages to or from it are discarded.
    pub async fn detach(&self, module_id: &ModuleId) {
        let mut endpoints = self.endpoints.write().await;
        endpoints.remove(module_id);

        let mut channels = self.channels.write().await;
        channels.retain(|(from, to), _| from != module_id && to != module_id);

        let mut stats = self.stats.write().await;
        stats.attached_endpoints = endpoints.len();
        stats.channel_count = channels.len();

        tracing::debug!(module_id = %module_id, "endpoint detached");
    }

    /// Send a message from one module to another.
    ///
    /// The channel is created on first use. Fails with `UnknownDestination`
    /// if either endpoint is not attached, `ChannelFull` if the queue is at
    /// capacity.
    pub async fn send(&self, from: &ModuleId, to: &ModuleId, message: Message) -> Result<()> {
        {
            let endpoints = self.endpoints.read().await;
            if !endpoints.contains(from) {
                return Err(Error::unknown_destination(format!(
                    "sender not attached: {}",
                    from
                )));
            }
            if !endpoints.contains(to) {
                return Err(Error::unknown_destination(format!(
                    "receiver not attached: {}",
                    to
                )));
            }
        }

        let mut channels = self.channels.write().await;
        let queue = channels
            .entry((from.clone(), to.clone()))
            .or_insert_with(VecDeque::new);

        if queue.len() >= self.capacity {
            return Err(Error::channel_full(format!(
                "channel {} -> {} at capacity {}",
                from, to, self.capacity
            )));
        }

        tracing::debug!(%from, %to, kind = %message.kind, "message queued");
        queue.push_back(message);

        let channel_count = channels.len();
        drop(channels);

        let mut stats = self.stats.write().await;
        stats.messages_sent += 1;
        stats.channel_count = channel_count;

        Ok(())
    }

    /// Drain all pending messages addressed to a destination.
    ///
    /// Messages are consumed exactly once, FIFO within each source channel;
    /// sources are visited in sorted id order so the result is
    /// deterministic.
    pub async fn drain(&self, to: &ModuleId) -> Result<Vec<Message>> {
        {
            let endpoints = self.endpoints.read().await;
            if !endpoints.contains(to) {
                return Err(Error::unknown_destination(format!(
                    "receiver not attached: {}",
                    to
                )));
            }
        }

        let mut channels = self.channels.write().await;
        let mut sources: Vec<ModuleId> = channels
            .keys()
            .filter(|(_, dest)| dest == to)
            .map(|(from, _)| from.clone())
            .collect();
        sources.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        let mut drained = Vec::new();
        for from in sources {
            if let Some(queue) = channels.get_mut(&(from, to.clone())) {
                drained.extend(queue.drain(..));
            }
        }
        drop(channels);

        let mut stats = self.stats.write().await;
        stats.messages_drained += drained.len() as u64;

        Ok(drained)
    }

    /// Number of channels created so far.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Get current fabric statistics.
    pub async fn stats(&self) -> FabricStats {
        self.stats.read().await.clone()
    }
}
