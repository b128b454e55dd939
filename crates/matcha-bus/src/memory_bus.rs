use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::BusError;

/// Per-channel buffer. Slow subscribers lag (and lose messages) past this.
const CHANNEL_CAPACITY: usize = 1024;

/// Single-process bus: one broadcast channel per topic plus a key store.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<MemoryBusInner>,
}

#[derive(Default)]
struct MemoryBusInner {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    keys: Mutex<HashMap<String, String>>,
}

impl MemoryBus {
    fn sender(&self, channel: &str) -> Result<broadcast::Sender<String>, BusError> {
        let mut topics = self.inner.topics.lock().map_err(|_| BusError::Poisoned)?;
        let tx = topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(tx.clone())
    }

    /// Returns how many subscribers received the message.
    pub fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        // No receivers is not an error: the message is simply not delivered.
        Ok(self.sender(channel)?.send(payload).unwrap_or(0))
    }

    pub fn subscribe(&self, channel: &str) -> Result<broadcast::Receiver<String>, BusError> {
        Ok(self.sender(channel)?.subscribe())
    }

    pub fn set_key(&self, key: &str, value: &str) -> Result<(), BusError> {
        self.inner
            .keys
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn del_key(&self, key: &str) -> Result<(), BusError> {
        self.inner
            .keys
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .remove(key);
        Ok(())
    }

    pub fn get_key(&self, key: &str) -> Result<Option<String>, BusError> {
        Ok(self
            .inner
            .keys
            .lock()
            .map_err(|_| BusError::Poisoned)?
            .get(key)
            .cloned())
    }
}
