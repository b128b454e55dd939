use std::pin::Pin;

use futures_util::Stream;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::info;

use crate::BusError;

pub(crate) type MessageStream = Pin<Box<dyn Stream<Item = redis::Msg> + Send>>;

/// Redis-backed bus for deployments where the gateway and the subscriber run
/// as separate processes.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl RedisBus {
    pub async fn connect(addr: &str) -> Result<Self, BusError> {
        let url = if addr.starts_with("redis://") || addr.starts_with("rediss://") {
            addr.to_string()
        } else {
            format!("redis://{addr}")
        };
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;

        info!("Connected to Redis bus at {}", addr);
        Ok(Self { client, conn })
    }

    pub async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        let mut conn = self.conn.clone();
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    /// Opens a dedicated pub-sub connection for `channel`.
    pub(crate) async fn subscribe(&self, channel: &str) -> Result<MessageStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        Ok(Box::pin(pubsub.into_on_message()))
    }

    pub async fn set_key(&self, key: &str, value: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    pub async fn del_key(&self, key: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    pub async fn get_key(&self, key: &str) -> Result<Option<String>, BusError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }
}
