//! End-to-end real-time path wired the way the binary wires it: gateway
//! sessions publish onto the bus, the subscriber persists and fans out, and
//! the gateway pumps deliver back to the right socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use matcha_api::mailer::MemoryMailer;
use matcha_api::{ApiConfig, AppState, AppStateInner, Subscriber, SubscriberHandle};
use matcha_bus::{Bus, channels};
use matcha_db::{Database, StoreError};
use matcha_gateway::Gateway;
use matcha_types::models::AuthProvider;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Server {
    addr: SocketAddr,
    state: AppState,
    shutdown: CancellationToken,
    subscriber: SubscriberHandle,
}

async fn start() -> Server {
    let bus = Bus::memory();
    let config = ApiConfig {
        jwt_signing_key: "realtime-test-key".into(),
        hmac_secret: "realtime-test-hmac".into(),
        base_url: "http://localhost:8080".into(),
        google: None,
    };
    let state = AppStateInner::new(
        config,
        Database::open_in_memory().unwrap(),
        bus.clone(),
        Arc::new(MemoryMailer::default()),
    )
    .unwrap();

    let shutdown = CancellationToken::new();
    let subscriber = Subscriber::new(state.clone(), 2)
        .start(shutdown.clone())
        .await
        .unwrap();
    let gateway = Gateway::new(bus, state.tokens.clone(), shutdown.clone());
    gateway.start().await.unwrap();

    let app = matcha_api::router(state.clone()).merge(gateway.routes());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    Server {
        addr,
        state,
        shutdown,
        subscriber,
    }
}

/// Two users that already matched.
fn matched_pair(state: &AppState) -> (Uuid, Uuid) {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    state
        .db
        .unit_of_work(|repos| {
            repos.users().create(a)?;
            repos.users().create(b)?;
            repos.connections().create(a, b)?;
            Ok::<_, StoreError>(())
        })
        .unwrap();
    (a, b)
}

/// Connects as `user` and waits until the gateway has marked them online.
async fn connect(server: &Server, user: Uuid) -> Client {
    let token = server
        .state
        .tokens
        .mint(user, true, AuthProvider::Local)
        .unwrap();
    let (ws, _) = connect_async(format!("ws://{}/ws?access_token={token}", server.addr))
        .await
        .unwrap();

    let key = channels::status_key(user);
    tokio::time::timeout(WAIT, async {
        while server.state.bus.get_key(&key).await.unwrap().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("user never came online");
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_text(ws: &mut Client) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Next frame that is not a presence update.
async fn next_event(ws: &mut Client) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = next_text(ws).await;
            if frame["type"] != "presence_event" {
                return frame;
            }
        }
    })
    .await
    .expect("no frame within timeout")
}

/// Next presence update about `peer`.
async fn next_presence(ws: &mut Client, peer: Uuid) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = next_text(ws).await;
            if frame["type"] == "presence_event" && frame["payload"]["user_id"] == peer.to_string()
            {
                return frame["payload"].clone();
            }
        }
    })
    .await
    .expect("no presence update within timeout")
}

#[tokio::test]
async fn chat_read_receipt_and_presence_reach_the_right_sockets() {
    let server = start().await;
    let (a, b) = matched_pair(&server.state);

    let mut ws_a = connect(&server, a).await;
    let mut ws_b = connect(&server, b).await;
    assert_eq!(next_presence(&mut ws_a, b).await["status"], "online");

    // Chat: the sender is acked, the recipient gets the message and a notification.
    send(
        &mut ws_a,
        json!({"type": "chat_event", "payload": {"recipient_id": b, "content": "hi"}}),
    )
    .await;

    let ack = next_event(&mut ws_a).await;
    assert_eq!(ack["type"], "ack_event");
    let message_id = ack["payload"]["message_id"].as_i64().unwrap();
    assert!(message_id > 0);

    let mut received = vec![next_event(&mut ws_b).await, next_event(&mut ws_b).await];
    received.sort_by_key(|frame| frame["type"].as_str().unwrap_or_default().to_string());
    let (chat, notification) = (&received[0], &received[1]);

    assert_eq!(chat["type"], "chat_event");
    assert_eq!(chat["payload"]["id"], message_id);
    assert_eq!(chat["payload"]["sender_id"], a.to_string());
    assert_eq!(chat["payload"]["content"], "hi");

    assert_eq!(notification["type"], "notification_event");
    assert_eq!(notification["payload"]["type"], "message");
    assert_eq!(notification["payload"]["sender_id"], a.to_string());

    // Read receipt: persisted, then forwarded to the original sender.
    send(
        &mut ws_b,
        json!({"type": "read_event", "payload": {"recipient_id": a, "timestamp": 77}}),
    )
    .await;

    let read = next_event(&mut ws_a).await;
    assert_eq!(read["type"], "read_event");
    assert_eq!(read["payload"]["user_id"], b.to_string());
    assert_eq!(read["payload"]["timestamp"], 77);

    let stored = server
        .state
        .db
        .with_repos(|repos| repos.messages().find(message_id))
        .unwrap()
        .unwrap();
    assert!(stored.is_read);

    // Presence: the match sees B go offline, then come back.
    ws_b.close(None).await.unwrap();
    assert_eq!(next_presence(&mut ws_a, b).await["status"], "offline");
    assert_eq!(
        server.state.bus.get_key(&channels::status_key(b)).await.unwrap(),
        None
    );

    let _ws_b = connect(&server, b).await;
    assert_eq!(next_presence(&mut ws_a, b).await["status"], "online");

    server.shutdown.cancel();
    server.subscriber.join().await;
}
