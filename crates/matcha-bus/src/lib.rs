//! Pub-sub transport between the WebSocket gateway and the message
//! subscriber, plus the small key store used for connection status.
//!
//! Two backends share one API: [`Bus::memory`] for a single process (and for
//! tests), [`Bus::redis`] when gateway and subscriber run on separate hosts.
//! Delivery is at-most-once in both.

pub mod channels;
mod memory_bus;
mod redis_bus;

use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use memory_bus::MemoryBus;
pub use redis_bus::RedisBus;

const BACKOFF_BASE: Duration = Duration::from_millis(200);
const BACKOFF_MAX: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("bus lock poisoned")]
    Poisoned,
}

#[derive(Clone)]
pub enum Bus {
    Memory(MemoryBus),
    Redis(RedisBus),
}

impl Bus {
    pub fn memory() -> Self {
        Self::Memory(MemoryBus::default())
    }

    pub async fn redis(addr: &str) -> Result<Self, BusError> {
        Ok(Self::Redis(RedisBus::connect(addr).await?))
    }

    /// Fire-and-forget publish. Returns the number of subscribers reached.
    pub async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        match self {
            Self::Memory(bus) => bus.publish(channel, payload),
            Self::Redis(bus) => bus.publish(channel, payload).await,
        }
    }

    pub async fn publish_json<T: Serialize>(
        &self,
        channel: &str,
        payload: &T,
    ) -> Result<usize, BusError> {
        let payload = serde_json::to_string(payload)?;
        self.publish(channel, payload).await
    }

    pub async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let inner = match self {
            Self::Memory(bus) => SubscriptionInner::Memory(bus.subscribe(channel)?),
            Self::Redis(bus) => SubscriptionInner::Redis(bus.subscribe(channel).await?),
        };
        Ok(Subscription {
            channel: channel.to_string(),
            inner,
        })
    }

    /// Retries `subscribe` with jittered exponential backoff until it
    /// succeeds. `None` once `shutdown` fires.
    pub async fn resubscribe(
        &self,
        channel: &str,
        shutdown: &CancellationToken,
    ) -> Option<Subscription> {
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(backoff(attempt)) => {}
            }

            match self.subscribe(channel).await {
                Ok(subscription) => {
                    info!("Resubscribed to {} after {} attempts", channel, attempt + 1);
                    return Some(subscription);
                }
                Err(e) => {
                    warn!("Resubscribe to {} failed (attempt {}): {}", channel, attempt + 1, e);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    pub async fn set_key(&self, key: &str, value: &str) -> Result<(), BusError> {
        match self {
            Self::Memory(bus) => bus.set_key(key, value),
            Self::Redis(bus) => bus.set_key(key, value).await,
        }
    }

    pub async fn del_key(&self, key: &str) -> Result<(), BusError> {
        match self {
            Self::Memory(bus) => bus.del_key(key),
            Self::Redis(bus) => bus.del_key(key).await,
        }
    }

    pub async fn get_key(&self, key: &str) -> Result<Option<String>, BusError> {
        match self {
            Self::Memory(bus) => bus.get_key(key),
            Self::Redis(bus) => bus.get_key(key).await,
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    let capped = BACKOFF_BASE.saturating_mul(1 << attempt.min(6)).min(BACKOFF_MAX);
    let jitter_ms = rand::rng().random_range(0..=capped.as_millis() as u64 / 2);
    capped + Duration::from_millis(jitter_ms)
}

/// A live subscription to one channel.
pub struct Subscription {
    channel: String,
    inner: SubscriptionInner,
}

enum SubscriptionInner {
    Memory(broadcast::Receiver<String>),
    Redis(redis_bus::MessageStream),
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next raw payload. `None` means the underlying connection is gone and
    /// the caller should resubscribe.
    pub async fn next(&mut self) -> Option<String> {
        match &mut self.inner {
            SubscriptionInner::Memory(rx) => loop {
                match rx.recv().await {
                    Ok(payload) => return Some(payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {} lagged, dropped {} messages", self.channel, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            SubscriptionInner::Redis(stream) => loop {
                let msg = stream.next().await?;
                match msg.get_payload::<String>() {
                    Ok(payload) => return Some(payload),
                    Err(e) => warn!("Non-text payload on {}: {}", self.channel, e),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn memory_publish_reaches_every_subscriber() {
        let bus = Bus::memory();
        let mut first = bus.subscribe(channels::ACK).await.unwrap();
        let mut second = bus.subscribe(channels::ACK).await.unwrap();

        let reached = bus.publish(channels::ACK, "hello".into()).await.unwrap();
        assert_eq!(reached, 2);
        assert_eq!(first.next().await.as_deref(), Some("hello"));
        assert_eq!(second.next().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn memory_publish_without_subscribers_is_dropped() {
        let bus = Bus::memory();
        let reached = bus.publish(channels::CHAT_OUTGOING, "lost".into()).await.unwrap();
        assert_eq!(reached, 0);

        // A late subscriber never sees what was published before it joined.
        let mut late = bus.subscribe(channels::CHAT_OUTGOING).await.unwrap();
        bus.publish(channels::CHAT_OUTGOING, "seen".into()).await.unwrap();
        assert_eq!(late.next().await.as_deref(), Some("seen"));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let bus = Bus::memory();
        let mut ack = bus.subscribe(channels::ACK).await.unwrap();
        bus.publish(channels::NOTIFICATION, "other".into()).await.unwrap();

        let got = tokio::time::timeout(Duration::from_millis(50), ack.next()).await;
        assert!(got.is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let first = backoff(0);
        assert!(first >= BACKOFF_BASE && first <= BACKOFF_BASE * 3 / 2);

        let late = backoff(30);
        assert!(late >= BACKOFF_MAX && late <= BACKOFF_MAX * 3 / 2);
    }

    #[tokio::test]
    async fn resubscribe_gives_up_on_shutdown() {
        let bus = Bus::memory();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        assert!(bus.resubscribe(channels::ACK, &shutdown).await.is_none());
    }

    #[tokio::test]
    async fn key_store_round_trip() {
        let bus = Bus::memory();
        let key = channels::status_key(Uuid::new_v4());

        assert_eq!(bus.get_key(&key).await.unwrap(), None);
        bus.set_key(&key, "online").await.unwrap();
        assert_eq!(bus.get_key(&key).await.unwrap().as_deref(), Some("online"));
        bus.del_key(&key).await.unwrap();
        assert_eq!(bus.get_key(&key).await.unwrap(), None);
    }
}
