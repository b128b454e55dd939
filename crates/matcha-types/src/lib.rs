//! Wire types shared by the Matcha API, subscriber and gateway.
//!
//! - [`events`]: bus payloads and WebSocket frames
//! - [`api`]: HTTP request/response bodies
//! - [`models`]: domain enums persisted by the store
//! - [`token`]: access-token claims and the HS256 codec both services verify with

pub mod api;
pub mod events;
pub mod models;
pub mod token;
