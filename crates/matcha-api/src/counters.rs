use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::error;

use matcha_bus::Bus;

/// Real-time delivery counters shared by the subscriber and the services
/// that publish after a commit.
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    chats: AtomicU64,
    reads: AtomicU64,
    presence_fanouts: AtomicU64,
    failed_publishes: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub chats: u64,
    pub reads: u64,
    pub presence_fanouts: u64,
    pub failed_publishes: u64,
}

impl DeliveryCounters {
    pub fn chat_handled(&self) {
        self.chats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_handled(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn presence_fanned_out(&self, peers: u64) {
        self.presence_fanouts.fetch_add(peers, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.failed_publishes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            chats: self.chats.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            presence_fanouts: self.presence_fanouts.load(Ordering::Relaxed),
            failed_publishes: self.failed_publishes.load(Ordering::Relaxed),
        }
    }

    /// Publishes after a commit. Failure is logged and counted, never
    /// returned: the committed state stands.
    pub async fn publish<T: Serialize>(&self, bus: &Bus, channel: &str, payload: &T) -> bool {
        match bus.publish_json(channel, payload).await {
            Ok(_) => true,
            Err(e) => {
                error!("Publish on {} failed after commit: {}", channel, e);
                self.publish_failed();
                false
            }
        }
    }
}
