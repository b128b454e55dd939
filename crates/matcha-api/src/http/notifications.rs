use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};

use matcha_types::api::{MarkAllReadResponse, MessageResponse, NotificationView, PageQuery};
use matcha_types::token::Claims;

use crate::error::Result;
use crate::state::AppState;

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<NotificationView>>> {
    Ok(Json(state.notifications.list(claims.sub, page).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>> {
    state.notifications.mark_read(id, claims.sub).await?;
    Ok(Json(MessageResponse::new("Notification marked as read")))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MarkAllReadResponse>> {
    let updated = state.notifications.mark_all_read(claims.sub).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
