use std::sync::Arc;

use matcha_bus::Bus;
use matcha_db::Database;
use matcha_types::token::AccessTokens;

use crate::counters::DeliveryCounters;
use crate::credentials::RefreshTokenHasher;
use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::oauth::{GoogleConfig, OAuthClient};
use crate::services::{AuthService, ChatService, NotificationService, ProfileService, UserService};

/// Secrets and external endpoints the API needs at startup.
#[derive(Clone)]
pub struct ApiConfig {
    pub jwt_signing_key: String,
    pub hmac_secret: String,
    pub base_url: String,
    pub google: Option<GoogleConfig>,
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub bus: Bus,
    pub tokens: AccessTokens,
    pub counters: Arc<DeliveryCounters>,
    pub auth: AuthService,
    pub users: UserService,
    pub notifications: NotificationService,
    pub chats: ChatService,
    pub profiles: ProfileService,
}

impl AppStateInner {
    pub fn new(
        config: ApiConfig,
        db: Database,
        bus: Bus,
        mailer: Arc<dyn Mailer>,
    ) -> Result<AppState, ApiError> {
        let tokens = AccessTokens::new(config.jwt_signing_key.as_bytes());
        let refresh = RefreshTokenHasher::new(config.hmac_secret.as_bytes())?;
        let counters = Arc::new(DeliveryCounters::default());

        let notifications = NotificationService::new(db.clone(), bus.clone(), counters.clone());
        let auth = AuthService::new(
            db.clone(),
            tokens.clone(),
            refresh,
            mailer,
            OAuthClient::new(config.google),
            config.base_url.trim_end_matches('/').to_string(),
        );

        Ok(Arc::new(Self {
            users: UserService::new(db.clone(), notifications.clone()),
            chats: ChatService::new(db.clone()),
            profiles: ProfileService::new(db.clone(), notifications.clone()),
            notifications,
            auth,
            tokens,
            counters,
            bus,
            db,
        }))
    }
}
