//! Presigned image upload endpoint.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;

use crate::error::AppError;
use crate::middleware::RequireAdminAuth;
use crate::services::SignedUpload;
use crate::state::AppState;

/// Body of `POST /api/uploads/sign`.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub filename: String,
    pub content_type: String,
}

/// Sign a direct-to-bucket `PUT` for a product image.
///
/// Returns 503 when no bucket is configured and 400 for non-image types.
#[tracing::instrument(skip(admin, state, body), fields(content_type = %body.content_type))]
pub async fn sign(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Json(body): Json<SignRequest>,
) -> Result<Json<SignedUpload>, AppError> {
    let signer = state.uploads().ok_or(AppError::StorageUnavailable)?;
    let signed = signer.sign_product_image(&body.filename, &body.content_type, Utc::now())?;
    tracing::info!(key = %signed.key, admin_id = %admin.id, "Signed product image upload");
    Ok(Json(signed))
}
