//! WebSocket gateway: authenticates sessions, owns the `user -> connection`
//! routing table, forwards client frames to the bus and pumps outbound bus
//! channels back to the owning connection.

pub mod handshake;
pub mod pumps;
pub mod routing;
pub mod session;

use axum::Router;
use axum::routing::get;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use matcha_bus::{Bus, BusError};
use matcha_types::token::AccessTokens;

pub use routing::{Outbound, RoutingTable};
pub use session::Heartbeat;

#[derive(Clone)]
pub struct Gateway {
    pub table: RoutingTable,
    pub bus: Bus,
    pub tokens: AccessTokens,
    pub heartbeat: Heartbeat,
    pub shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(bus: Bus, tokens: AccessTokens, shutdown: CancellationToken) -> Self {
        Self {
            table: RoutingTable::new(bus.clone()),
            bus,
            tokens,
            heartbeat: Heartbeat::default(),
            shutdown,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Heartbeat) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Starts the five egress pumps. They run until `shutdown` fires.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, BusError> {
        pumps::spawn_pumps(self.table.clone(), self.bus.clone(), self.shutdown.clone()).await
    }

    /// `GET /ws`, ready to be served alone or merged into a larger router.
    pub fn routes(&self) -> Router {
        Router::new()
            .route("/ws", get(handshake::ws_upgrade))
            .with_state(self.clone())
    }
}
