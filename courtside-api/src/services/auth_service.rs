use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use rand::Rng;
use uuid::Uuid;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{NewOtpCode, OtpCode, User};
use crate::schema::{otp_codes, users};
use crate::services::token_service::hash_token;

pub const OTP_TTL_MINUTES: i64 = 5;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    format!("REF_{}", rng.gen_range(100_000..1_000_000))
}

/// Loads a user that exists and is not soft-deleted.
pub fn find_live_user_by_email(conn: &mut PgConnection, email: &str) -> AppResult<User> {
    users::table
        .filter(users::email.eq(email.to_lowercase()))
        .filter(users::is_deleted.eq(false))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))
}

pub fn find_live_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    users::table
        .find(user_id)
        .filter(users::is_deleted.eq(false))
        .select(User::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "User not found"))
}

pub fn email_taken(conn: &mut PgConnection, email: &str) -> AppResult<bool> {
    let count: i64 = users::table
        .filter(users::email.eq(email.to_lowercase()))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

/// Stores a fresh hashed code for `email` and returns the plaintext to mail out.
pub fn issue_otp(conn: &mut PgConnection, email: &str) -> AppResult<String> {
    let code = generate_otp();
    diesel::insert_into(otp_codes::table)
        .values(&NewOtpCode {
            email: email.to_lowercase(),
            code_hash: hash_token(&code),
            expires_at: Utc::now() + Duration::minutes(OTP_TTL_MINUTES),
        })
        .execute(conn)?;
    Ok(code)
}

/// Checks `code` against the latest unused code for `email`. `consume` marks it used.
pub fn verify_otp(conn: &mut PgConnection, email: &str, code: &str, consume: bool) -> AppResult<()> {
    let latest: OtpCode = otp_codes::table
        .filter(otp_codes::email.eq(email.to_lowercase()))
        .filter(otp_codes::used_at.is_null())
        .order(otp_codes::created_at.desc())
        .select(OtpCode::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::OtpInvalid, "Invalid OTP"))?;

    check_otp(&latest, code, Utc::now())?;

    if consume {
        diesel::update(otp_codes::table.find(latest.id))
            .set(otp_codes::used_at.eq(Some(Utc::now())))
            .execute(conn)?;
    }
    Ok(())
}

fn check_otp(otp: &OtpCode, code: &str, now: chrono::DateTime<Utc>) -> AppResult<()> {
    if otp.expires_at < now {
        return Err(AppError::new(ErrorCode::OtpExpired, "OTP has expired"));
    }
    if otp.code_hash != hash_token(code.trim()) {
        return Err(AppError::new(ErrorCode::OtpInvalid, "Invalid OTP"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn otp(code: &str, expires_in: i64) -> OtpCode {
        let now = Utc::now();
        OtpCode {
            id: Uuid::new_v4(),
            email: "a@b.c".into(),
            code_hash: hash_token(code),
            expires_at: now + Duration::seconds(expires_in),
            used_at: None,
            created_at: now,
        }
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("hunter2!").unwrap();
        assert!(verify_password("hunter2!", &hash).unwrap());
        assert!(!verify_password("hunter3!", &hash).unwrap());
    }

    #[test]
    fn otp_is_six_digits() {
        for _ in 0..50 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn referral_code_format() {
        let code = generate_referral_code();
        let digits = code.strip_prefix("REF_").unwrap();
        let n: u32 = digits.parse().unwrap();
        assert!((100_000..1_000_000).contains(&n));
    }

    #[test]
    fn otp_check_rejects_mismatch_and_expiry() {
        let now = Utc::now();
        assert!(check_otp(&otp("123456", 60), "123456", now).is_ok());
        assert!(check_otp(&otp("123456", 60), " 123456 ", now).is_ok());

        let err = check_otp(&otp("123456", 60), "654321", now).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::OtpInvalid);

        let err = check_otp(&otp("123456", -1), "123456", now).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::OtpExpired);
    }
}
