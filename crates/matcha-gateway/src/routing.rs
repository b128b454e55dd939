use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use matcha_bus::{Bus, channels};
use matcha_types::events::SelfPresence;
use matcha_types::models::PresenceStatus;

/// What the session writer is told to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized `ServerEvent` frame.
    Frame(String),
    /// Close the socket. Sent to a session that was replaced by a newer one.
    Close,
}

struct Route {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

/// The gateway's `user_id -> connection` table. At most one live connection
/// per user; the mailbox behind each entry is the only path to its socket.
#[derive(Clone)]
pub struct RoutingTable {
    inner: Arc<RoutingTableInner>,
}

struct RoutingTableInner {
    routes: RwLock<HashMap<Uuid, Route>>,
    bus: Bus,
}

impl RoutingTable {
    pub fn new(bus: Bus) -> Self {
        Self {
            inner: Arc::new(RoutingTableInner {
                routes: RwLock::new(HashMap::new()),
                bus,
            }),
        }
    }

    /// Installs a mailbox for `user_id`, closing any connection it replaces,
    /// then marks the user online. Returns `(conn_id, mailbox)`.
    ///
    /// Presence is announced while the write lock is held, so the status key
    /// always reflects whichever connection owns the route last.
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<Outbound>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut routes = self.inner.routes.write().await;
        if let Some(prior) = routes.insert(user_id, Route { conn_id, tx }) {
            info!("{} reconnected, closing connection {}", user_id, prior.conn_id);
            let _ = prior.tx.send(Outbound::Close);
        }
        self.announce(user_id, PresenceStatus::Online).await;
        drop(routes);

        (conn_id, rx)
    }

    /// Removes the entry only while it still belongs to `conn_id`, marking
    /// the user offline under the same write lock. Returns whether anything
    /// was removed; repeated calls are no-ops.
    pub async fn deregister(&self, user_id: Uuid, conn_id: Uuid) -> bool {
        let mut routes = self.inner.routes.write().await;
        match routes.get(&user_id) {
            Some(route) if route.conn_id == conn_id => {}
            _ => return false,
        }
        routes.remove(&user_id);
        self.announce(user_id, PresenceStatus::Offline).await;
        true
    }

    /// Queues `frame` on the user's mailbox. Returns `false` when the user has
    /// no connection here (the frame is dropped) or the session is gone.
    pub async fn deliver(&self, user_id: Uuid, frame: String) -> bool {
        let stale = {
            let routes = self.inner.routes.read().await;
            let Some(route) = routes.get(&user_id) else {
                debug!("{} not connected, dropping frame", user_id);
                return false;
            };
            match route.tx.send(Outbound::Frame(frame)) {
                Ok(()) => return true,
                Err(_) => route.conn_id,
            }
        };

        warn!("Mailbox for {} closed, deregistering", user_id);
        self.deregister(user_id, stale).await;
        false
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.routes.read().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.routes.read().await.len()
    }

    async fn announce(&self, user_id: Uuid, status: PresenceStatus) {
        let bus = &self.inner.bus;
        let key = channels::status_key(user_id);

        let stored = match status {
            PresenceStatus::Online => bus.set_key(&key, status.as_str()).await,
            PresenceStatus::Offline => bus.del_key(&key).await,
        };
        if let Err(e) = stored {
            warn!("Failed to update status key for {}: {}", user_id, e);
        }

        let event = SelfPresence { user_id, status };
        if let Err(e) = bus.publish_json(channels::PRESENCE_EVENT, &event).await {
            warn!("Failed to publish {} presence for {}: {}", status, user_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_marks_user_online() {
        let bus = Bus::memory();
        let mut presence = bus.subscribe(channels::PRESENCE_EVENT).await.unwrap();
        let table = RoutingTable::new(bus.clone());
        let user = Uuid::new_v4();

        let (_conn, _rx) = table.register(user).await;

        assert!(table.is_connected(user).await);
        assert_eq!(
            bus.get_key(&channels::status_key(user)).await.unwrap().as_deref(),
            Some("online")
        );
        let event: SelfPresence = serde_json::from_str(&presence.next().await.unwrap()).unwrap();
        assert_eq!(event, SelfPresence { user_id: user, status: PresenceStatus::Online });
    }

    #[tokio::test]
    async fn reconnect_closes_prior_connection() {
        let table = RoutingTable::new(Bus::memory());
        let user = Uuid::new_v4();

        let (old_conn, mut old_rx) = table.register(user).await;
        let (_new_conn, mut new_rx) = table.register(user).await;

        assert_eq!(old_rx.recv().await, Some(Outbound::Close));
        assert_eq!(table.len().await, 1);

        // The stale session's cleanup must not evict the new one.
        assert!(!table.deregister(user, old_conn).await);
        assert_eq!(
            table.inner.bus.get_key(&channels::status_key(user)).await.unwrap().as_deref(),
            Some("online")
        );
        assert!(table.deliver(user, "frame".into()).await);
        assert_eq!(new_rx.recv().await, Some(Outbound::Frame("frame".into())));
    }

    #[tokio::test]
    async fn deregister_is_idempotent_and_marks_offline() {
        let bus = Bus::memory();
        let table = RoutingTable::new(bus.clone());
        let user = Uuid::new_v4();
        let (conn, _rx) = table.register(user).await;

        let mut presence = bus.subscribe(channels::PRESENCE_EVENT).await.unwrap();
        assert!(table.deregister(user, conn).await);
        assert!(!table.deregister(user, conn).await);

        assert!(!table.is_connected(user).await);
        assert_eq!(bus.get_key(&channels::status_key(user)).await.unwrap(), None);
        let event: SelfPresence = serde_json::from_str(&presence.next().await.unwrap()).unwrap();
        assert_eq!(event.status, PresenceStatus::Offline);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_disconnect_and_reconnect_leave_user_online() {
        let bus = Bus::memory();
        let table = RoutingTable::new(bus.clone());
        let user = Uuid::new_v4();
        let key = channels::status_key(user);

        for _ in 0..200 {
            let (old_conn, _old_rx) = table.register(user).await;

            let disconnect = {
                let table = table.clone();
                tokio::spawn(async move { table.deregister(user, old_conn).await })
            };
            let reconnect = {
                let table = table.clone();
                tokio::spawn(async move { table.register(user).await })
            };
            disconnect.await.unwrap();
            let (new_conn, _new_rx) = reconnect.await.unwrap();

            // Either order ends with the new connection owning the route.
            assert!(table.is_connected(user).await);
            assert_eq!(bus.get_key(&key).await.unwrap().as_deref(), Some("online"));

            assert!(table.deregister(user, new_conn).await);
            assert_eq!(bus.get_key(&key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn deliver_to_offline_user_is_dropped() {
        let table = RoutingTable::new(Bus::memory());
        assert!(!table.deliver(Uuid::new_v4(), "frame".into()).await);
    }

    #[tokio::test]
    async fn deliver_to_dead_session_deregisters() {
        let table = RoutingTable::new(Bus::memory());
        let user = Uuid::new_v4();
        let (_conn, rx) = table.register(user).await;
        drop(rx);

        assert!(!table.deliver(user, "frame".into()).await);
        assert!(!table.is_connected(user).await);
    }
}
