//! Credential Check Handler
//!
//! A bare username/password check returning a boolean verdict. There is
//! no session or token issuance; terminals only gate their UI on it.

use axum::{Json, extract::State};

use crate::core::ServerState;
use crate::db::repository::user;
use crate::utils::AppResult;
use shared::models::{LoginRequest, LoginResponse};

/// POST /api/login
///
/// Always 200 with `{ "success": bool }`; unknown users and wrong
/// passwords are indistinguishable.
pub async fn login(
    State(state): State<ServerState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let success = user::verify_credentials(state.pool(), &req.username, &req.password).await?;

    if !success {
        tracing::warn!(username = %req.username, "Login failed - invalid credentials");
    }

    Ok(Json(LoginResponse { success }))
}
