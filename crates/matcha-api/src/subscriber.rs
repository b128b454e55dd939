//! Server-side consumer of client-origin bus traffic: persists chat
//! messages and read receipts, then publishes their effects, and redistributes
//! gateway self-presence to each matched peer.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{SubsecRound, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use matcha_bus::{Bus, BusError, Subscription, channels};
use matcha_db::models::ordered_pair;
use matcha_db::repositories::MessageQuery;
use matcha_types::events::{
    AckPayload, ChatIncoming, MessagePayload, PresencePayload, ReadPayload, SelfPresence,
};
use matcha_types::models::NotificationKind;

use crate::state::AppState;

pub const DEFAULT_CHAT_WORKERS: usize = 4;
const WORKER_QUEUE: usize = 256;

/// Worker that owns the conversation between `a` and `b`. Symmetric in its
/// arguments so both directions land on the same worker.
pub fn worker_for(a: Uuid, b: Uuid, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    ordered_pair(a, b).hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

#[derive(Clone)]
pub struct Subscriber {
    state: AppState,
    workers: usize,
}

pub struct SubscriberHandle {
    state: AppState,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriberHandle {
    /// Waits for every consumer and chat worker to finish draining.
    pub async fn join(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Subscriber task failed: {}", e);
            }
        }
        let counters = self.state.counters.snapshot();
        info!(
            chats = counters.chats,
            reads = counters.reads,
            presence_fanouts = counters.presence_fanouts,
            failed_publishes = counters.failed_publishes,
            "Subscriber stopped"
        );
    }
}

impl Subscriber {
    pub fn new(state: AppState, workers: usize) -> Self {
        Self {
            state,
            workers: workers.max(1),
        }
    }

    /// Subscribes to the three inbound channels before returning, then
    /// consumes them until `shutdown` fires. Reading stops first; queued chat
    /// messages are still persisted and published.
    pub async fn start(self, shutdown: CancellationToken) -> Result<SubscriberHandle, BusError> {
        let bus = self.state.bus.clone();
        let chats = bus.subscribe(channels::CHAT_INCOMING).await?;
        let reads = bus.subscribe(channels::READ_INCOMING).await?;
        let presence = bus.subscribe(channels::PRESENCE_EVENT).await?;

        let mut tasks = Vec::with_capacity(self.workers + 3);
        let mut queues = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let (tx, mut rx) = mpsc::channel::<ChatIncoming>(WORKER_QUEUE);
            queues.push(tx);
            let worker = self.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    worker.handle_chat(payload).await;
                }
            }));
        }

        let workers = self.workers;
        tasks.push(tokio::spawn(consume(
            chats,
            bus.clone(),
            shutdown.clone(),
            move |payload: ChatIncoming| {
                let queue = queues[worker_for(payload.sender_id, payload.recipient_id, workers)].clone();
                async move {
                    if queue.send(payload).await.is_err() {
                        error!("Chat worker gone, message dropped");
                    }
                }
            },
        )));

        let reader = self.clone();
        tasks.push(tokio::spawn(consume(
            reads,
            bus.clone(),
            shutdown.clone(),
            move |payload: ReadPayload| {
                let reader = reader.clone();
                async move { reader.handle_read(payload).await }
            },
        )));

        let presence_handler = self.clone();
        tasks.push(tokio::spawn(consume(
            presence,
            bus,
            shutdown,
            move |payload: SelfPresence| {
                let handler = presence_handler.clone();
                async move { handler.handle_presence(payload).await }
            },
        )));

        info!("Subscriber started with {} chat workers", self.workers);
        Ok(SubscriberHandle {
            state: self.state,
            tasks,
        })
    }

    /// Persists the message, then acks the sender, forwards the message and
    /// notifies the recipient concurrently.
    pub async fn handle_chat(&self, payload: ChatIncoming) {
        let ChatIncoming {
            sender_id,
            recipient_id,
            content,
        } = payload;
        if sender_id == recipient_id || content.trim().is_empty() {
            warn!("Dropping chat from {}: empty or self-addressed", sender_id);
            return;
        }

        let state = &self.state;
        // Storage keeps microseconds; forward the same instant.
        let sent_at = Utc::now().trunc_subsecs(6);
        let message = match state
            .db
            .transaction(move |repos| {
                repos
                    .messages()
                    .create(sender_id, recipient_id, &content, sent_at)
            })
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!("Failed to persist chat from {}: {}", sender_id, e);
                return;
            }
        };
        state.counters.chat_handled();

        let ack = AckPayload {
            user_id: sender_id,
            message_id: message.id,
            timestamp: Utc::now().timestamp_millis(),
        };
        let outgoing = MessagePayload {
            id: message.id,
            sender_id,
            recipient_id,
            content: message.content,
            sent_at: message.sent_at,
        };

        tokio::join!(
            state.counters.publish(&state.bus, channels::ACK, &ack),
            state
                .counters
                .publish(&state.bus, channels::CHAT_OUTGOING, &outgoing),
            state
                .notifications
                .notify(Some(sender_id), recipient_id, NotificationKind::Message),
        );
    }

    /// Marks everything `recipient_id` sent to the reader as read, then
    /// forwards the receipt to `recipient_id`.
    pub async fn handle_read(&self, payload: ReadPayload) {
        if payload.user_id == payload.recipient_id {
            warn!("Dropping self-addressed read receipt from {}", payload.user_id);
            return;
        }

        let state = &self.state;
        let (reader, sender) = (payload.user_id, payload.recipient_id);
        let marked = state
            .db
            .transaction(move |repos| {
                let messages = repos.messages();
                let unread = messages.query(&MessageQuery {
                    sender: Some(sender),
                    recipient: Some(reader),
                    is_read: Some(false),
                    ..Default::default()
                })?;
                for message in &unread {
                    messages.mark_read(message.id)?;
                }
                Ok::<_, matcha_db::StoreError>(unread.len())
            })
            .await;

        match marked {
            Ok(count) => debug!("{} marked {} messages from {} read", reader, count, sender),
            Err(e) => {
                error!("Failed to mark messages read for {}: {}", reader, e);
                return;
            }
        }
        state.counters.read_handled();
        state
            .counters
            .publish(&state.bus, channels::READ_OUTGOING, &payload)
            .await;
    }

    /// Sends the user's new status to every matched peer.
    pub async fn handle_presence(&self, payload: SelfPresence) {
        let state = &self.state;
        let user = payload.user_id;
        let peers = match state
            .db
            .read(move |repos| repos.connections().list_for(user))
            .await
        {
            Ok(connections) => connections.into_iter().map(|c| c.peer_of(user)),
            Err(e) => {
                error!("Failed to load connections of {}: {}", user, e);
                return;
            }
        };

        let mut fanned_out = 0;
        for peer in peers {
            let event = PresencePayload {
                user_id: user,
                recipient_id: peer,
                status: payload.status,
            };
            if state
                .counters
                .publish(&state.bus, channels::PRESENCE_OUTGOING, &event)
                .await
            {
                fanned_out += 1;
            }
        }
        state.counters.presence_fanned_out(fanned_out);
        debug!("Presence {} of {} sent to {} peers", payload.status, user, fanned_out);
    }
}

/// Decodes each payload on `subscription` and hands it to `handle`, in
/// order, until `shutdown` fires. A dropped subscription is re-established.
async fn consume<T, F, Fut>(
    mut subscription: Subscription,
    bus: Bus,
    shutdown: CancellationToken,
    mut handle: F,
) where
    T: DeserializeOwned,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = ()>,
{
    let channel = subscription.channel().to_string();
    loop {
        loop {
            let raw = tokio::select! {
                _ = shutdown.cancelled() => return,
                raw = subscription.next() => raw,
            };
            let Some(raw) = raw else { break };
            match serde_json::from_str::<T>(&raw) {
                Ok(payload) => handle(payload).await,
                Err(e) => warn!("Malformed payload on {}: {}", channel, e),
            }
        }

        warn!("Subscription to {} ended, resubscribing", channel);
        subscription = match bus.resubscribe(&channel, &shutdown).await {
            Some(subscription) => subscription,
            None => return,
        };
    }
}
