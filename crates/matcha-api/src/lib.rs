//! Matcha domain layer and REST surface: services over the Unit of Work, the
//! bus subscriber that persists real-time traffic, and the axum handlers.

pub mod counters;
pub mod credentials;
pub mod error;
pub mod http;
pub mod mailer;
pub mod middleware;
pub mod oauth;
pub mod services;
pub mod state;
pub mod subscriber;

pub use error::ApiError;
pub use http::router;
pub use state::{ApiConfig, AppState, AppStateInner};
pub use subscriber::{Subscriber, SubscriberHandle};
