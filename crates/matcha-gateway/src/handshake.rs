use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::Gateway;
use crate::session::run_session;

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    /// Browsers cannot set headers on a WebSocket upgrade, so the bearer may
    /// also arrive as `?access_token=`.
    pub access_token: Option<String>,
}

/// Reads the bearer from `Authorization: Bearer <token>`, falling back to the
/// query parameter.
pub fn bearer_token<'a>(headers: &'a HeaderMap, params: &'a HandshakeParams) -> Option<&'a str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or(params.access_token.as_deref())
}

/// `GET /ws`: validates the bearer before upgrading. An invalid or missing
/// credential yields 401 and no upgrade.
pub async fn ws_upgrade(
    State(gateway): State<Gateway>,
    headers: HeaderMap,
    Query(params): Query<HandshakeParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(token) = bearer_token(&headers, &params) else {
        debug!("WebSocket upgrade without bearer");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match gateway.tokens.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("WebSocket upgrade with invalid token: {}", e);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let user_id = claims.sub;
    ws.on_upgrade(move |socket| {
        run_session(
            socket,
            gateway.table.clone(),
            gateway.bus.clone(),
            user_id,
            gateway.heartbeat,
            gateway.shutdown.clone(),
        )
    })
}
