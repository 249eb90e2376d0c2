//! Account Model and login DTOs

use serde::{Deserialize, Serialize};

/// Application user (POS terminal account)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct AppUser {
    pub id: i64,
    pub username: String,
    /// Argon2 PHC string, never serialized out
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
}

/// Login request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response body: a bare boolean verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
}
