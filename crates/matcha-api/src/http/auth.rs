use axum::{
    Extension, Json,
    extract::{Path, State},
};

use matcha_types::api::{
    LoginRequest, LoginResponse, LogoutRequest, MessageResponse, OAuthLoginRequest,
    PasswordResetConfirm, PasswordResetRequest, RefreshRequest, RefreshResponse, SignupRequest,
};
use matcha_types::models::AuthProvider;
use matcha_types::token::Claims;

use crate::error::{ApiError, Result};
use crate::state::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.signup(&req.email, &req.password).await?;
    Ok(Json(MessageResponse::new(
        "Signup successful, check your email to verify your account",
    )))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(state.auth.login(&req.email, &req.password).await?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>> {
    Ok(Json(state.auth.refresh(&req.refresh_token).await?))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.auth.verify_email(&token).await?;
    Ok(Json(MessageResponse::new("Email verified")))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.logout(claims.sub, &req.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>> {
    state.auth.request_password_reset(&req.email).await?;
    Ok(Json(MessageResponse::new(
        "If the address is registered, a reset link is on its way",
    )))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirm>,
) -> Result<Json<MessageResponse>> {
    state
        .auth
        .confirm_password_reset(&req.token, &req.password)
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}

pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(req): Json<OAuthLoginRequest>,
) -> Result<Json<LoginResponse>> {
    let provider: AuthProvider = provider
        .parse()
        .map_err(|e: matcha_types::models::UnknownVariant| ApiError::invalid(e.to_string()))?;
    Ok(Json(
        state
            .auth
            .oauth_login(provider, &req.code, &req.code_verifier)
            .await?,
    ))
}
