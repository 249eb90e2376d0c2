//! User Repository and credential check

use super::{RepoError, RepoResult};
use shared::models::AppUser;
use sqlx::SqlitePool;

/// Username created when the user table is empty
const DEFAULT_USERNAME: &str = "admin";

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> RepoResult<Option<AppUser>> {
    let user = sqlx::query_as::<_, AppUser>(
        "SELECT id, username, password_hash, is_active FROM app_user WHERE username = ? LIMIT 1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Verify a username/password pair against the stored argon2 hash
///
/// A plain boolean verdict: unknown user, disabled account, and a wrong
/// password are indistinguishable to the caller.
pub async fn verify_credentials(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> RepoResult<bool> {
    let Some(user) = find_by_username(pool, username).await? else {
        return Ok(false);
    };
    if !user.is_active {
        return Ok(false);
    }

    verify_password(&user.password_hash, password)
        .map_err(|e| RepoError::Validation(format!("Corrupt password hash: {e}")))
}

/// Create the default account on first start so a fresh install is usable
///
/// Password comes from `DEFAULT_ADMIN_PASSWORD` (falls back to "admin" for
/// development setups).
pub async fn ensure_default_user(pool: &SqlitePool) -> RepoResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_user")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let password =
        std::env::var("DEFAULT_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());
    let hash = hash_password(&password)
        .map_err(|e| RepoError::Validation(format!("Failed to hash default password: {e}")))?;

    sqlx::query("INSERT INTO app_user (username, password_hash, is_active) VALUES (?, ?, 1)")
        .bind(DEFAULT_USERNAME)
        .bind(hash)
        .execute(pool)
        .await?;

    tracing::info!(username = DEFAULT_USERNAME, "Default user created");
    Ok(())
}

/// Verify a password against an argon2 PHC string
pub fn verify_password(
    stored_hash: &str,
    password: &str,
) -> Result<bool, argon2::password_hash::Error> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHash, PasswordVerifier},
    };

    let parsed_hash = PasswordHash::new(stored_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash a password with argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::{
        Argon2,
        password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(password_hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let hash = hash_password("caramba").unwrap();
        assert!(verify_password(&hash, "caramba").unwrap());
        assert!(!verify_password(&hash, "wrong").unwrap());
    }
}
