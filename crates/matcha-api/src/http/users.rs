use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use matcha_bus::channels;
use matcha_types::api::{
    ConnectionView, LikeResponse, MessageResponse, ProfileDetails, ReportRequest, StatusResponse,
};
use matcha_types::token::Claims;

use crate::error::Result;
use crate::state::AppState;

pub async fn like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<LikeResponse>> {
    let outcome = state.users.like(claims.sub, user_id).await?;
    let message = if outcome.is_match() {
        "It's a match!"
    } else {
        "User liked successfully"
    };

    Ok(Json(LikeResponse {
        connection: outcome.connection.map(|c| ConnectionView {
            user1_id: c.user1_id,
            user2_id: c.user2_id,
            created_at: c.created_at,
        }),
        message: message.into(),
    }))
}

pub async fn unlike(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.users.unlike(claims.sub, user_id).await?;
    Ok(Json(MessageResponse::new("User unliked successfully")))
}

pub async fn block(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.users.block(claims.sub, user_id).await?;
    Ok(Json(MessageResponse::new("User blocked")))
}

pub async fn unblock(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MessageResponse>> {
    state.users.unblock(claims.sub, user_id).await?;
    Ok(Json(MessageResponse::new("User unblocked")))
}

pub async fn report(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<ReportRequest>,
) -> Result<Json<MessageResponse>> {
    state.users.report(claims.sub, user_id, req.reason).await?;
    Ok(Json(MessageResponse::new("User reported")))
}

/// Online while the gateway holds a connection for the user.
pub async fn status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    let online = state
        .bus
        .get_key(&channels::status_key(user_id))
        .await?
        .is_some();
    Ok(Json(StatusResponse { user_id, online }))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileDetails>> {
    Ok(Json(state.profiles.view(claims.sub, user_id).await?))
}

pub async fn set_profile_picture(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(picture_id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state
        .profiles
        .set_profile_picture(claims.sub, picture_id)
        .await?;
    Ok(Json(MessageResponse::new("Profile picture updated")))
}
