use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use courier_types::api::{
    Claims, MarkReadRequest, MarkReadResponse, SendMessageRequest, UnreadCountResponse,
};
use courier_types::models::MessageRecord;

use crate::error::ApiError;
use crate::{AppState, with_db};

/// POST /messages — persist, then hand the stored record to the router.
///
/// The response depends only on the write; delivery runs in the background
/// and its outcome is logged, never returned.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("message content is empty"));
    }

    let message_id = Uuid::new_v4();
    let sender_id = claims.sub;
    let receiver_id = req.receiver_id;
    let content = req.content;

    let record = with_db(&state, move |db| {
        if db.get_user_by_id(&receiver_id.to_string())?.is_none() {
            return Ok(None);
        }
        let row = db.create_message(
            &message_id.to_string(),
            &content,
            &sender_id.to_string(),
            &receiver_id.to_string(),
        )?;
        Ok(Some(MessageRecord::try_from(row)?))
    })
    .await?
    .ok_or(ApiError::NotFound("receiver not found"))?;

    debug!("message {} persisted ({} -> {})", record.id, sender_id, receiver_id);
    state.router.route(record.clone());

    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /messages/{user_id} — the conversation between the session user and
/// `user_id`, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub.to_string();
    let other = user_id.to_string();

    let messages = with_db(&state, move |db| {
        db.get_conversation(&me, &other)?
            .into_iter()
            .map(MessageRecord::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await?;

    Ok(Json(messages))
}

/// POST /messages/read — mark everything `sender_id` sent to the session
/// user as read. Nothing is pushed back over the gateway.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = req.sender_id.to_string();
    let receiver = claims.sub.to_string();

    let updated = with_db(&state, move |db| db.mark_read(&sender, &receiver)).await?;

    Ok(Json(MarkReadResponse { updated }))
}

/// GET /messages/unread/{user_id} — unread messages from `user_id` to the
/// session user, counted at request time.
pub async fn unread_count(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = user_id.to_string();
    let receiver = claims.sub.to_string();

    let count = with_db(&state, move |db| db.count_unread(&sender, &receiver)).await?;

    Ok(Json(UnreadCountResponse { count }))
}
