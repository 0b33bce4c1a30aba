use diesel::prelude::*;
use diesel::PgConnection;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::types::auth::{AuthUser, SubscriptionTier, UserRole};

use crate::schema::users;

pub const PAID_TIERS: &[SubscriptionTier] = &[SubscriptionTier::Pro, SubscriptionTier::Elite];

pub fn tier_permits(role: UserRole, tier: SubscriptionTier, allowed: &[SubscriptionTier]) -> bool {
    allowed.is_empty() || role == UserRole::Admin || allowed.contains(&tier)
}

/// Checks the caller's stored tier. The token's tier can lag a webhook upgrade or downgrade.
pub fn require_tier(conn: &mut PgConnection, user: &AuthUser, allowed: &[SubscriptionTier]) -> AppResult<()> {
    if allowed.is_empty() || user.is_admin() {
        return Ok(());
    }

    let stored: Option<String> = users::table
        .find(user.id)
        .filter(users::is_deleted.eq(false))
        .select(users::subscribe_status)
        .first(conn)
        .optional()?;

    let tier = stored
        .and_then(|s| s.parse().ok())
        .unwrap_or(SubscriptionTier::Free);

    if tier_permits(user.role, tier, allowed) {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::SubscriptionRequired,
            "Your current subscription level does not permit access to this resource",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_allows_everyone() {
        assert!(tier_permits(UserRole::Athlete, SubscriptionTier::Free, &[]));
    }

    #[test]
    fn admins_bypass() {
        assert!(tier_permits(UserRole::Admin, SubscriptionTier::Free, PAID_TIERS));
    }

    #[test]
    fn tier_must_be_listed() {
        assert!(tier_permits(UserRole::Athlete, SubscriptionTier::Pro, PAID_TIERS));
        assert!(tier_permits(UserRole::User, SubscriptionTier::Elite, PAID_TIERS));
        assert!(!tier_permits(UserRole::Athlete, SubscriptionTier::Free, PAID_TIERS));
        assert!(!tier_permits(UserRole::Athlete, SubscriptionTier::Comped, PAID_TIERS));
    }
}
