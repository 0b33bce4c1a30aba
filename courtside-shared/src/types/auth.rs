use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Athlete,
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Athlete => "ATHLETE",
            UserRole::User => "USER",
            UserRole::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ATHLETE" => Ok(UserRole::Athlete),
            "USER" => Ok(UserRole::User),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Subscription level carried on every user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Elite,
    Comped,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 4] = [
        SubscriptionTier::Free,
        SubscriptionTier::Pro,
        SubscriptionTier::Elite,
        SubscriptionTier::Comped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Free => "FREE",
            SubscriptionTier::Pro => "PRO",
            SubscriptionTier::Elite => "ELITE",
            SubscriptionTier::Comped => "COMPED",
        }
    }

    /// Tier granted by a paid plan: yearly plans are ELITE, everything else PRO.
    pub fn for_interval(interval: &str) -> Self {
        if interval.eq_ignore_ascii_case("year") {
            SubscriptionTier::Elite
        } else {
            SubscriptionTier::Pro
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FREE" => Ok(SubscriptionTier::Free),
            "PRO" => Ok(SubscriptionTier::Pro),
            "ELITE" => Ok(SubscriptionTier::Elite),
            "COMPED" => Ok(SubscriptionTier::Comped),
            _ => Err(format!("unknown subscription tier: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub tier: SubscriptionTier,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(
        user_id: Uuid,
        email: impl Into<String>,
        role: UserRole,
        tier: SubscriptionTier,
        duration_secs: i64,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            email: email.into(),
            role,
            tier,
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub tier: SubscriptionTier,
    pub token_id: Uuid,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
            tier: claims.tier,
            token_id: claims.jti,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenPair {
    pub fn new(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yearly_plans_grant_elite() {
        assert_eq!(SubscriptionTier::for_interval("year"), SubscriptionTier::Elite);
        assert_eq!(SubscriptionTier::for_interval("month"), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::for_interval(""), SubscriptionTier::Pro);
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("ATHLETE".parse::<UserRole>().unwrap(), UserRole::Athlete);
        assert!("coach".parse::<UserRole>().is_err());
    }

    #[test]
    fn tier_serializes_uppercase() {
        let json = serde_json::to_string(&SubscriptionTier::Comped).unwrap();
        assert_eq!(json, "\"COMPED\"");
    }
}
