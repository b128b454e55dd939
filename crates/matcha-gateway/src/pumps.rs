//! Egress pumps: one long-lived consumer per outbound bus channel, each
//! writing decoded events into the addressee's mailbox.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use matcha_bus::{Bus, BusError, Subscription, channels};
use matcha_types::events::{
    AckPayload, MessagePayload, NotificationPayload, PresencePayload, ReadPayload, ServerEvent,
};

use crate::routing::RoutingTable;

type Decode = fn(&str) -> serde_json::Result<ServerEvent>;

fn notification(raw: &str) -> serde_json::Result<ServerEvent> {
    serde_json::from_str::<NotificationPayload>(raw).map(ServerEvent::NotificationEvent)
}

fn chat(raw: &str) -> serde_json::Result<ServerEvent> {
    serde_json::from_str::<MessagePayload>(raw).map(ServerEvent::ChatEvent)
}

fn ack(raw: &str) -> serde_json::Result<ServerEvent> {
    serde_json::from_str::<AckPayload>(raw).map(ServerEvent::AckEvent)
}

fn presence(raw: &str) -> serde_json::Result<ServerEvent> {
    serde_json::from_str::<PresencePayload>(raw).map(ServerEvent::PresenceEvent)
}

fn read(raw: &str) -> serde_json::Result<ServerEvent> {
    serde_json::from_str::<ReadPayload>(raw).map(ServerEvent::ReadEvent)
}

/// Channel name and how its payloads become client frames.
const PUMPS: [(&str, Decode); 5] = [
    (channels::NOTIFICATION, notification),
    (channels::CHAT_OUTGOING, chat),
    (channels::ACK, ack),
    (channels::PRESENCE_OUTGOING, presence),
    (channels::READ_OUTGOING, read),
];

/// Subscribes all five pumps, then runs them in the background until
/// `shutdown` fires. Fails only if an initial subscription fails.
pub async fn spawn_pumps(
    table: RoutingTable,
    bus: Bus,
    shutdown: CancellationToken,
) -> Result<Vec<JoinHandle<()>>, BusError> {
    let mut handles = Vec::with_capacity(PUMPS.len());
    for (channel, decode) in PUMPS {
        let subscription = bus.subscribe(channel).await?;
        handles.push(tokio::spawn(run_pump(
            subscription,
            decode,
            table.clone(),
            bus.clone(),
            shutdown.clone(),
        )));
    }
    info!("Started {} egress pumps", handles.len());
    Ok(handles)
}

async fn run_pump(
    mut subscription: Subscription,
    decode: Decode,
    table: RoutingTable,
    bus: Bus,
    shutdown: CancellationToken,
) {
    let channel = subscription.channel().to_string();
    loop {
        loop {
            let raw = tokio::select! {
                _ = shutdown.cancelled() => return,
                raw = subscription.next() => raw,
            };
            match raw {
                Some(raw) => forward(&table, decode, &channel, &raw).await,
                None => break,
            }
        }

        warn!("Subscription to {} ended, resubscribing", channel);
        subscription = match bus.resubscribe(&channel, &shutdown).await {
            Some(subscription) => subscription,
            None => return,
        };
    }
}

async fn forward(table: &RoutingTable, decode: Decode, channel: &str, raw: &str) {
    let event = match decode(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!("Malformed payload on {}: {}", channel, e);
            return;
        }
    };

    let frame = match serde_json::to_string(&event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode frame from {}: {}", channel, e);
            return;
        }
    };

    table.deliver(event.addressee(), frame).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::routing::Outbound;

    #[tokio::test]
    async fn ack_is_routed_to_sender_mailbox() {
        let bus = Bus::memory();
        let table = RoutingTable::new(bus.clone());
        let shutdown = CancellationToken::new();
        let user = Uuid::new_v4();
        let (_conn, mut mailbox) = table.register(user).await;

        spawn_pumps(table.clone(), bus.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish_json(
            channels::ACK,
            &AckPayload { user_id: user, message_id: 9, timestamp: 1 },
        )
        .await
        .unwrap();

        let Some(Outbound::Frame(frame)) = mailbox.recv().await else {
            panic!("expected a frame");
        };
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "ack_event");
        assert_eq!(value["payload"]["message_id"], 9);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn malformed_payload_is_skipped() {
        let bus = Bus::memory();
        let table = RoutingTable::new(bus.clone());
        let shutdown = CancellationToken::new();
        let user = Uuid::new_v4();
        let (_conn, mut mailbox) = table.register(user).await;

        spawn_pumps(table.clone(), bus.clone(), shutdown.clone())
            .await
            .unwrap();
        bus.publish(channels::READ_OUTGOING, "{not json".into())
            .await
            .unwrap();
        bus.publish_json(
            channels::READ_OUTGOING,
            &ReadPayload { user_id: Uuid::new_v4(), recipient_id: user, timestamp: 5 },
        )
        .await
        .unwrap();

        let Some(Outbound::Frame(frame)) = mailbox.recv().await else {
            panic!("expected a frame");
        };
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "read_event");
        assert_eq!(value["payload"]["timestamp"], 5);
        shutdown.cancel();
    }

    #[tokio::test]
    async fn pumps_stop_on_shutdown() {
        let bus = Bus::memory();
        let table = RoutingTable::new(bus.clone());
        let shutdown = CancellationToken::new();

        let handles = spawn_pumps(table, bus, shutdown.clone()).await.unwrap();
        shutdown.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
