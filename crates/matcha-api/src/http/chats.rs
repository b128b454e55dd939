use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use matcha_types::api::{ChatMessage, ChatSummary, PageQuery};
use matcha_types::token::Claims;

use crate::error::Result;
use crate::state::AppState;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ChatSummary>>> {
    Ok(Json(state.chats.list_chats(claims.sub).await?))
}

pub async fn list_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(peer): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ChatMessage>>> {
    Ok(Json(state.chats.list_messages(claims.sub, peer, page).await?))
}
