use axum::{Json, extract::State};

use courier_types::api::PublicKeyResponse;

use crate::AppState;
use crate::error::ApiError;

/// GET /push/public-key — the VAPID key clients need to create a
/// subscription before sending it over the gateway.
pub async fn public_key(State(state): State<AppState>) -> Result<Json<PublicKeyResponse>, ApiError> {
    let public_key = state
        .vapid_public_key
        .clone()
        .ok_or(ApiError::Unavailable("push notifications are not configured"))?;

    Ok(Json(PublicKeyResponse { public_key }))
}
