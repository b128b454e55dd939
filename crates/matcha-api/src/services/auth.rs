use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use matcha_db::models::{Auth, PasswordReset, RefreshToken, VerificationToken};
use matcha_db::repositories::AuthQuery;
use matcha_db::{Database, StoreError};
use matcha_types::api::{LoginResponse, RefreshResponse};
use matcha_types::models::AuthProvider;
use matcha_types::token::AccessTokens;

use crate::credentials::{
    RefreshTokenHasher, hash_password, validate_email, validate_password, verify_password,
};
use crate::error::{ApiError, Result};
use crate::mailer::{Mail, Mailer};
use crate::oauth::{Identity, OAuthClient};

pub const REFRESH_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;
pub const VERIFICATION_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const PASSWORD_RESET_TTL_SECS: i64 = 60 * 60;

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    tokens: AccessTokens,
    refresh: RefreshTokenHasher,
    mailer: Arc<dyn Mailer>,
    oauth: OAuthClient,
    base_url: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl AuthService {
    pub fn new(
        db: Database,
        tokens: AccessTokens,
        refresh: RefreshTokenHasher,
        mailer: Arc<dyn Mailer>,
        oauth: OAuthClient,
        base_url: String,
    ) -> Self {
        Self {
            db,
            tokens,
            refresh,
            mailer,
            oauth,
            base_url,
        }
    }

    /// Creates an unverified local account and mails a verification link.
    pub async fn signup(&self, email: &str, password: &str) -> Result<()> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        let password_hash = hash_password(password)?;

        let user_id = Uuid::new_v4();
        let account_email = email.clone();
        self.db
            .transaction(move |repos| {
                if repos.auths().find_local_by_email(&account_email)?.is_some() {
                    return Err(ApiError::invalid("email already registered"));
                }
                repos.users().create(user_id)?;
                repos.auths().create(&Auth {
                    user_id,
                    provider: AuthProvider::Local,
                    email: Some(account_email),
                    password_hash: Some(password_hash),
                    provider_uid: None,
                    is_verified: false,
                })?;
                Ok(())
            })
            .await?;

        let token = VerificationToken {
            token: Uuid::new_v4().to_string(),
            user_id,
            expires_at: Utc::now() + Duration::seconds(VERIFICATION_TOKEN_TTL_SECS),
        };
        let link = format!("{}/api/v1/auth/verify/{}", self.base_url, token.token);
        self.db
            .transaction(move |repos| repos.verification_tokens().upsert(&token))
            .await?;

        self.mailer
            .send(Mail {
                to: email,
                subject: "Verify your Matcha account".into(),
                body: format!("Confirm your email address: {link}"),
            })
            .map_err(ApiError::internal)?;

        info!("User {} signed up", user_id);
        Ok(())
    }

    /// Consumes a verification token. Unknown or expired tokens are
    /// unauthorized.
    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let token = token.to_string();
        self.db
            .transaction(move |repos| {
                let found = repos
                    .verification_tokens()
                    .find(&token)?
                    .ok_or(ApiError::Unauthorized)?;
                if found.expires_at <= Utc::now() {
                    return Err(ApiError::Unauthorized);
                }
                repos.auths().mark_verified(found.user_id, AuthProvider::Local)?;
                repos.verification_tokens().delete(&token)?;
                Ok(())
            })
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let email = normalize_email(email);
        let auth = self
            .db
            .read(move |repos| repos.auths().find_local_by_email(&email))
            .await?
            .ok_or_else(|| ApiError::NotFound("user".into()))?;

        let hash = auth.password_hash.as_deref().ok_or(ApiError::Unauthorized)?;
        if !verify_password(password, hash) {
            return Err(ApiError::Unauthorized);
        }

        self.issue(auth.user_id, auth.is_verified, AuthProvider::Local)
            .await
    }

    /// Mints an access token and a persisted refresh token.
    async fn issue(
        &self,
        user_id: Uuid,
        is_verified: bool,
        auth_method: AuthProvider,
    ) -> Result<LoginResponse> {
        let access_token = self
            .tokens
            .mint(user_id, is_verified, auth_method)
            .map_err(ApiError::internal)?;

        let refresh_token = Uuid::new_v4().to_string();
        let now = Utc::now();
        let row = RefreshToken {
            token_hash: self.refresh.hash(&refresh_token),
            user_id,
            expires_at: now + Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            created_at: now,
            revoked: false,
        };
        self.db
            .transaction(move |repos| repos.refresh_tokens().create(&row))
            .await?;

        Ok(LoginResponse {
            user_id,
            is_verified,
            auth_method,
            access_token,
            refresh_token,
        })
    }

    /// New access token for a live refresh token. The refresh token itself
    /// is not rotated.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let token_hash = self.refresh.hash(refresh_token);
        let auth = self
            .db
            .read(move |repos| {
                let row = repos
                    .refresh_tokens()
                    .find(&token_hash)?
                    .ok_or(ApiError::Unauthorized)?;
                if row.revoked || row.expires_at <= Utc::now() {
                    return Err(ApiError::Unauthorized);
                }
                repos
                    .auths()
                    .query(&AuthQuery {
                        user_id: Some(row.user_id),
                        ..Default::default()
                    })?
                    .into_iter()
                    .next()
                    .ok_or(ApiError::Unauthorized)
            })
            .await?;

        let access_token = self
            .tokens
            .mint(auth.user_id, auth.is_verified, auth.provider)
            .map_err(ApiError::internal)?;
        Ok(RefreshResponse { access_token })
    }

    /// Revokes the caller's refresh token and stamps the last connection.
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> Result<()> {
        let token_hash = self.refresh.hash(refresh_token);
        self.db
            .transaction(move |repos| {
                repos
                    .refresh_tokens()
                    .revoke(user_id, &token_hash)
                    .map_err(|e| match e {
                        StoreError::NotFound { .. } => ApiError::Unauthorized,
                        other => other.into(),
                    })?;
                repos.users().touch_last_connection(user_id, Utc::now())?;
                Ok(())
            })
            .await
    }

    /// Mails a reset link. Unknown addresses succeed silently.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let lookup = email.clone();
        let Some(auth) = self
            .db
            .read(move |repos| repos.auths().find_local_by_email(&lookup))
            .await?
        else {
            debug!("Password reset requested for unknown address");
            return Ok(());
        };

        let reset = PasswordReset {
            user_id: auth.user_id,
            token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::seconds(PASSWORD_RESET_TTL_SECS),
        };
        let link = format!("{}/reset-password?token={}", self.base_url, reset.token);
        self.db
            .transaction(move |repos| repos.password_resets().upsert(&reset))
            .await?;

        self.mailer
            .send(Mail {
                to: email,
                subject: "Reset your Matcha password".into(),
                body: format!("Choose a new password: {link}"),
            })
            .map_err(ApiError::internal)
    }

    pub async fn confirm_password_reset(&self, token: &str, password: &str) -> Result<()> {
        validate_password(password)?;
        let password_hash = hash_password(password)?;
        let token = token.to_string();

        self.db
            .transaction(move |repos| {
                let reset = repos
                    .password_resets()
                    .find_by_token(&token)?
                    .ok_or(ApiError::Unauthorized)?;
                if reset.expires_at <= Utc::now() {
                    return Err(ApiError::Unauthorized);
                }
                repos.auths().update_password(reset.user_id, &password_hash)?;
                repos.password_resets().delete(reset.user_id)?;
                Ok(())
            })
            .await
    }

    pub async fn oauth_login(
        &self,
        provider: AuthProvider,
        code: &str,
        code_verifier: &str,
    ) -> Result<LoginResponse> {
        let identity = self.oauth.exchange(provider, code, code_verifier).await?;
        self.login_with_identity(provider, identity).await
    }

    /// Finds the account linked to the provider identity, creating a
    /// verified one on first login.
    pub(crate) async fn login_with_identity(
        &self,
        provider: AuthProvider,
        identity: Identity,
    ) -> Result<LoginResponse> {
        let user_id = self
            .db
            .transaction(move |repos| {
                if let Some(auth) = repos.auths().find_by_provider_uid(provider, &identity.sub)? {
                    return Ok::<_, StoreError>(auth.user_id);
                }
                let user_id = Uuid::new_v4();
                repos.users().create(user_id)?;
                repos.auths().create(&Auth {
                    user_id,
                    provider,
                    email: identity.verified_email().map(str::to_string),
                    password_hash: None,
                    provider_uid: Some(identity.sub.clone()),
                    is_verified: true,
                })?;
                info!("Created {} account {}", provider, user_id);
                Ok(user_id)
            })
            .await?;

        self.issue(user_id, true, provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    async fn signed_up(ctx: &test_support::TestContext, email: &str) -> Uuid {
        ctx.state.auth.signup(email, "hunter2hunter2").await.unwrap();
        ctx.db
            .with_repos(|repos| repos.auths().find_local_by_email(email))
            .unwrap()
            .unwrap()
            .user_id
    }

    fn token_from(mail: &Mail) -> String {
        mail.body.rsplit(['/', '=']).next().unwrap().to_string()
    }

    #[tokio::test]
    async fn signup_rejects_bad_input_and_duplicates() {
        let ctx = test_support::context();
        let auth = &ctx.state.auth;

        assert!(matches!(auth.signup("nope", "hunter2hunter2").await, Err(ApiError::InvalidInput(_))));
        assert!(matches!(auth.signup("a@b.co", "short").await, Err(ApiError::InvalidInput(_))));

        auth.signup("a@b.co", "hunter2hunter2").await.unwrap();
        assert!(matches!(
            auth.signup("A@B.co", "hunter2hunter2").await,
            Err(ApiError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn verification_link_verifies_once() {
        let ctx = test_support::context();
        let user = signed_up(&ctx, "v@example.com").await;

        let mails = ctx.mailer.sent();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].to, "v@example.com");
        let token = token_from(&mails[0]);

        ctx.state.auth.verify_email(&token).await.unwrap();
        let auth = ctx
            .db
            .with_repos(|repos| repos.auths().find(user, AuthProvider::Local))
            .unwrap()
            .unwrap();
        assert!(auth.is_verified);

        assert!(matches!(
            ctx.state.auth.verify_email(&token).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn login_distinguishes_unknown_and_wrong_password() {
        let ctx = test_support::context();
        signed_up(&ctx, "l@example.com").await;

        assert!(matches!(
            ctx.state.auth.login("ghost@example.com", "hunter2hunter2").await,
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            ctx.state.auth.login("l@example.com", "wrong-password").await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn refresh_token_lifecycle() {
        let ctx = test_support::context();
        let user = signed_up(&ctx, "r@example.com").await;
        let auth = &ctx.state.auth;

        let login = auth.login("r@example.com", "hunter2hunter2").await.unwrap();
        assert_eq!(login.user_id, user);
        assert!(!login.is_verified);

        let claims = ctx.state.tokens.verify(&login.access_token).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.exp - claims.iat, 15 * 60);

        // Only the digest is stored.
        let stored = ctx
            .db
            .with_repos(|repos| repos.refresh_tokens().find(&test_support::refresh_hash(&login.refresh_token)))
            .unwrap()
            .unwrap();
        assert_eq!(stored.user_id, user);

        let refreshed = auth.refresh(&login.refresh_token).await.unwrap();
        assert_eq!(ctx.state.tokens.verify(&refreshed.access_token).unwrap().sub, user);

        auth.logout(user, &login.refresh_token).await.unwrap();
        assert!(matches!(auth.refresh(&login.refresh_token).await, Err(ApiError::Unauthorized)));
        assert!(matches!(auth.logout(user, &login.refresh_token).await, Ok(())));

        let last = ctx.db.with_repos(|repos| repos.users().find(user)).unwrap().unwrap();
        assert!(last.last_connection.is_some());
    }

    #[tokio::test]
    async fn logout_with_foreign_token_is_unauthorized() {
        let ctx = test_support::context();
        signed_up(&ctx, "x@example.com").await;
        let other = signed_up(&ctx, "y@example.com").await;
        let login = ctx.state.auth.login("x@example.com", "hunter2hunter2").await.unwrap();

        assert!(matches!(
            ctx.state.auth.logout(other, &login.refresh_token).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn password_reset_round_trip() {
        let ctx = test_support::context();
        signed_up(&ctx, "p@example.com").await;
        let auth = &ctx.state.auth;

        auth.request_password_reset("ghost@example.com").await.unwrap();
        assert_eq!(ctx.mailer.sent().len(), 1);

        auth.request_password_reset("p@example.com").await.unwrap();
        let token = token_from(ctx.mailer.sent().last().unwrap());

        assert!(matches!(
            auth.confirm_password_reset(&token, "short").await,
            Err(ApiError::InvalidInput(_))
        ));
        auth.confirm_password_reset(&token, "a-brand-new-pass").await.unwrap();

        assert!(auth.login("p@example.com", "a-brand-new-pass").await.is_ok());
        assert!(matches!(
            auth.login("p@example.com", "hunter2hunter2").await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            auth.confirm_password_reset(&token, "another-new-pass").await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn oauth_identity_creates_account_once() {
        let ctx = test_support::context();
        let identity = Identity {
            sub: "google-123".into(),
            iss: "https://accounts.google.com".into(),
            email: Some("g@example.com".into()),
            email_verified: false,
        };

        let first = ctx
            .state
            .auth
            .login_with_identity(AuthProvider::Google, identity.clone())
            .await
            .unwrap();
        let second = ctx
            .state
            .auth
            .login_with_identity(AuthProvider::Google, identity)
            .await
            .unwrap();
        assert_eq!(first.user_id, second.user_id);
        assert!(first.is_verified);
        assert_eq!(first.auth_method, AuthProvider::Google);

        let auth = ctx
            .db
            .with_repos(|repos| repos.auths().find(first.user_id, AuthProvider::Google))
            .unwrap()
            .unwrap();
        assert_eq!(auth.email, None, "unverified provider email is not stored");
    }
}
