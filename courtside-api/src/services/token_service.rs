use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use sha2::{Digest, Sha256};

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::auth::{Claims, TokenPair};

use crate::config::AppConfig;
use crate::models::{NewRefreshToken, RefreshToken, User};
use crate::schema::refresh_tokens;

pub fn create_access_token(user: &User, secret: &str, ttl_secs: i64) -> Result<String, AppError> {
    let claims = Claims::new(user.id, user.email.clone(), user.role(), user.tier(), ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

pub fn create_refresh_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signs an access token and persists the hash of a new refresh token.
pub fn issue_token_pair(conn: &mut PgConnection, user: &User, config: &AppConfig) -> AppResult<TokenPair> {
    let access_token = create_access_token(user, &config.jwt_secret, config.jwt_access_ttl)?;
    let refresh_token = create_refresh_token();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id: user.id,
            token_hash: hash_token(&refresh_token),
            expires_at: Utc::now() + Duration::seconds(config.jwt_refresh_ttl),
        })
        .execute(conn)?;

    Ok(TokenPair::new(access_token, refresh_token, config.jwt_access_ttl))
}

/// Looks up a usable refresh token and revokes it.
pub fn consume_refresh_token(conn: &mut PgConnection, token: &str) -> AppResult<RefreshToken> {
    let stored: RefreshToken = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(hash_token(token)))
        .select(RefreshToken::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "Invalid refresh token"))?;

    if stored.revoked_at.is_some() {
        return Err(AppError::new(ErrorCode::RefreshTokenRevoked, "Refresh token has been revoked"));
    }
    if stored.expires_at < Utc::now() {
        return Err(AppError::new(ErrorCode::TokenExpired, "Refresh token has expired"));
    }

    revoke(conn, stored.id)?;
    Ok(stored)
}

pub fn revoke_by_value(conn: &mut PgConnection, token: &str) -> AppResult<usize> {
    let updated = diesel::update(
        refresh_tokens::table
            .filter(refresh_tokens::token_hash.eq(hash_token(token)))
            .filter(refresh_tokens::revoked_at.is_null()),
    )
    .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
    .execute(conn)?;
    Ok(updated)
}

fn revoke(conn: &mut PgConnection, id: uuid::Uuid) -> AppResult<()> {
    diesel::update(refresh_tokens::table.find(id))
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_random_hex() {
        let a = create_refresh_token();
        let b = create_refresh_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_is_stable_sha256() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
