use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims, UserRole};

pub const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Application state that knows the key access tokens are signed with.
///
/// The extractors read the secret from state so HTTP routes, socket
/// handshakes and token issuance all agree on a single configured value.
pub trait JwtSecretSource {
    fn jwt_secret(&self) -> &str;
}

impl<T: JwtSecretSource + ?Sized> JwtSecretSource for Arc<T> {
    fn jwt_secret(&self) -> &str {
        (**self).jwt_secret()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: JwtSecretSource + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = validate_jwt(&token, state.jwt_secret())?;

        if claims.is_expired() {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        Ok(AuthUser::from(claims))
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::new(ErrorCode::Unauthorized, "invalid authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "authorization header must use Bearer scheme"))
}

/// Decodes and validates an HS256 access token.
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

/// Optional auth extractor
#[derive(Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: JwtSecretSource + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(_) => Ok(Self(None)),
        }
    }
}

/// Require Admin role
#[derive(Debug)]
pub struct AdminUser(pub AuthUser);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: JwtSecretSource + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            return Err(AppError::new(ErrorCode::Forbidden, "admin access required"));
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::auth::SubscriptionTier;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    struct KeyedState(&'static str);

    impl JwtSecretSource for KeyedState {
        fn jwt_secret(&self) -> &str {
            self.0
        }
    }

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn parts_with_bearer(token: &str) -> Parts {
        let (parts, _) = axum::http::Request::builder()
            .header("Authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[tokio::test]
    async fn extractor_uses_secret_from_state() {
        let claims = Claims::new(Uuid::now_v7(), "a@b.co", UserRole::Athlete, SubscriptionTier::Free, 60);
        let token = token_for(&claims, "prod-secret");
        let state = Arc::new(KeyedState("prod-secret"));

        let user = AuthUser::from_request_parts(&mut parts_with_bearer(&token), &state).await;
        assert_eq!(user.unwrap().id, claims.sub);

        let dev = KeyedState(DEV_JWT_SECRET);
        let err = AuthUser::from_request_parts(&mut parts_with_bearer(&token), &dev).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TokenInvalid);
    }

    #[tokio::test]
    async fn admin_extractor_requires_admin_role() {
        let state = KeyedState("k");
        let athlete = Claims::new(Uuid::now_v7(), "a@b.co", UserRole::Athlete, SubscriptionTier::Pro, 60);
        let err = AdminUser::from_request_parts(&mut parts_with_bearer(&token_for(&athlete, "k")), &state)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Forbidden);

        let admin = Claims::new(Uuid::now_v7(), "root@b.co", UserRole::Admin, SubscriptionTier::Free, 60);
        let AdminUser(user) = AdminUser::from_request_parts(&mut parts_with_bearer(&token_for(&admin, "k")), &state)
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn round_trips_claims() {
        let claims = Claims::new(Uuid::now_v7(), "a@b.co", UserRole::Athlete, SubscriptionTier::Pro, 60);
        let decoded = validate_jwt(&token_for(&claims, "s3cret"), "s3cret").unwrap();
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.tier, SubscriptionTier::Pro);
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims::new(Uuid::now_v7(), "a@b.co", UserRole::User, SubscriptionTier::Free, 60);
        let err = validate_jwt(&token_for(&claims, "one"), "two").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TokenInvalid);
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Token abc".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_err());
        headers.insert("Authorization", "Bearer abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc");
    }
}
