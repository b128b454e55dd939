use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use matcha_bus::{Bus, channels};
use matcha_types::events::{ChatIncoming, ClientEvent, ReadPayload};

use crate::routing::{Outbound, RoutingTable};

/// Server-side liveness check. The default pings every 15 seconds and drops
/// the connection after two consecutive missed Pongs (~30s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    pub max_missed_pongs: u8,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_missed_pongs: 2,
        }
    }
}

/// Runs one authenticated WebSocket session until the socket drops, the
/// session is replaced, or the gateway shuts down.
pub async fn run_session(
    socket: WebSocket,
    table: RoutingTable,
    bus: Bus,
    user_id: Uuid,
    heartbeat: Heartbeat,
    shutdown: CancellationToken,
) {
    let (conn_id, mut mailbox) = table.register(user_id).await;
    let (mut sender, mut receiver) = socket.split();
    info!("{} connected to gateway (conn {})", user_id, conn_id);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Single writer: everything headed for this socket goes through the mailbox.
    let send_shutdown = shutdown.clone();
    let mut send_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat.interval);
        ticker.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                out = mailbox.recv() => {
                    match out {
                        Some(Outbound::Frame(text)) => {
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(Outbound::Close) => {
                            let _ = sender.send(close(close_code::POLICY, "session replaced")).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= heartbeat.max_missed_pongs {
                            warn!("{} heartbeat timeout (missed {} pongs), dropping connection", user_id, missed_pongs);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                _ = send_shutdown.cancelled() => {
                    let _ = sender.send(close(close_code::AWAY, "server shutting down")).await;
                    break;
                }
            }
        }
    });

    let recv_bus = bus.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => handle_frame(&recv_bus, user_id, text.as_str()).await,
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Whichever side ends first takes the other down with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    table.deregister(user_id, conn_id).await;
    info!("{} disconnected from gateway (conn {})", user_id, conn_id);
}

fn close(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Parses one client frame and forwards it to the bus with the sender taken
/// from the session. Bad frames are logged and dropped.
pub(crate) async fn handle_frame(bus: &Bus, user_id: Uuid, text: &str) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            let raw: String = text.chars().take(200).collect();
            warn!("{} bad frame: {} -- raw: {}", user_id, e, raw);
            return;
        }
    };

    let published = match event {
        ClientEvent::ChatEvent(chat) => {
            let payload = ChatIncoming {
                sender_id: user_id,
                recipient_id: chat.recipient_id,
                content: chat.content,
            };
            bus.publish_json(channels::CHAT_INCOMING, &payload).await
        }
        ClientEvent::ReadEvent(read) => {
            let payload = ReadPayload {
                user_id,
                recipient_id: read.recipient_id,
                timestamp: read.timestamp,
            };
            bus.publish_json(channels::READ_INCOMING, &payload).await
        }
    };

    if let Err(e) = published {
        warn!("{} failed to forward frame: {}", user_id, e);
    }
}
