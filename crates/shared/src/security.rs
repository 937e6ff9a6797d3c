//! Tenant identity & access (spec 4.12). Generalizes the teacher's
//! `jsonwebtoken` usage from RS256/JWKS verification-only into a
//! self-issued HS256 issue+verify pair, since this system has no
//! external identity provider to defer to.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Role;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

/// Constant-time by construction: argon2's own verifier never
/// short-circuits on the first mismatched byte.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct TokenPair {
    pub token: String,
    pub expires_in: i64,
}

pub fn issue_token(user_id: Uuid, email: &str, role: Role, secret: &str, ttl: Duration) -> Result<TokenPair, AppError> {
    let now = Utc::now();
    let claims = Claims {
        id: user_id,
        email: email.to_string(),
        role: role.as_str().to_string(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|err| AppError::internal(format!("failed to sign token: {err}")))?;

    Ok(TokenPair {
        token,
        expires_in: ttl.num_seconds(),
    })
}

/// Fails with `UNAUTHORIZED` for missing, malformed, expired, or
/// invalidly-signed tokens, never with a more specific error — the spec
/// treats all of those as one undifferentiated auth failure.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::unauthorized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_correct_password_verifies_against_its_own_hash() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn malformed_hash_never_panics_and_fails_closed() {
        assert!(!verify_password("anything", "not-a-real-hash"));
    }

    #[test]
    fn a_freshly_issued_token_verifies() {
        let pair = issue_token(Uuid::new_v4(), "owner@example.com", Role::Tenant, "test-secret-at-least-16", Duration::hours(1)).unwrap();
        let claims = verify_token(&pair.token, "test-secret-at-least-16").unwrap();
        assert_eq!(claims.email, "owner@example.com");
        assert_eq!(claims.role, "tenant");
    }

    #[test]
    fn a_token_signed_with_a_different_secret_is_rejected() {
        let pair = issue_token(Uuid::new_v4(), "owner@example.com", Role::Tenant, "test-secret-at-least-16", Duration::hours(1)).unwrap();
        let result = verify_token(&pair.token, "a-completely-different-secret");
        assert!(result.is_err());
    }

    #[test]
    fn an_expired_token_is_rejected() {
        let pair = issue_token(Uuid::new_v4(), "owner@example.com", Role::Tenant, "test-secret-at-least-16", Duration::seconds(-10)).unwrap();
        let result = verify_token(&pair.token, "test-secret-at-least-16");
        assert!(result.is_err());
    }
}
