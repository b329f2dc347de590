//! Saksflyt API: Authentication
//!
//! Argon2 password hashing and HMAC-SHA256 signed bearer tokens:
//! `base64url(user_id "." expiry_unix) "." base64url(hmac(body))`.
//! Verification is constant-time via the MAC itself.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use saksflyt_core::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Token minting and credential checks.
pub struct AuthService {
    secret: Vec<u8>,
    ttl_minutes: i64,
}

impl AuthService {
    pub fn new(secret: &str, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_minutes,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::Storage(format!("password hash: {e}")))
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// Mint a bearer token for a user.
    pub fn mint_token(&self, user_id: Uuid, now: DateTime<Utc>) -> String {
        let expires = now + Duration::minutes(self.ttl_minutes);
        let body = format!("{user_id}.{}", expires.timestamp());
        let signature = self.sign(body.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(body.as_bytes()),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify signature and expiry; returns the user id.
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<Uuid> {
        let (body_b64, signature_b64) = token.split_once('.').ok_or(Error::Unauthorized)?;
        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| Error::Unauthorized)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| Error::Unauthorized)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| Error::Unauthorized)?;
        mac.update(&body);
        mac.verify_slice(&signature).map_err(|_| Error::Unauthorized)?;

        let body = String::from_utf8(body).map_err(|_| Error::Unauthorized)?;
        let (user_id, expires) = body.split_once('.').ok_or(Error::Unauthorized)?;
        let expires: i64 = expires.parse().map_err(|_| Error::Unauthorized)?;
        if now.timestamp() >= expires {
            return Err(Error::Unauthorized);
        }
        Uuid::parse_str(user_id).map_err(|_| Error::Unauthorized)
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        // Key length is unconstrained for HMAC; new_from_slice cannot fail.
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("hmac accepts any key size");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}
