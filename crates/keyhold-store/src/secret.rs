//! Secret storage schemes.
//!
//! [`SecretScheme::Plain`] keeps the value verbatim and compares it
//! byte-for-byte. [`SecretScheme::Pbkdf2`] stores
//! `iterations:base64(salt):base64(hash)` derived with
//! PBKDF2-HMAC-SHA256 and checks candidates in constant time.

use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use serde::Deserialize;

use crate::error::{StoreError, StoreResult};

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// Derived key length in bytes.
const KEY_LEN: usize = 32;

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// How a secret is persisted in the `accounts.secret` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretScheme {
    /// Stored as provided.
    #[default]
    Plain,
    /// Salted PBKDF2-HMAC-SHA256.
    Pbkdf2,
}

impl SecretScheme {
    /// Parse from the string stored in SQLite.
    pub fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "plain" => Ok(Self::Plain),
            "pbkdf2" => Ok(Self::Pbkdf2),
            other => Err(StoreError::Secret(format!("unknown secret scheme: {other}"))),
        }
    }

    /// Convert to the string stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Pbkdf2 => "pbkdf2",
        }
    }
}

impl std::fmt::Display for SecretScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a raw secret into the value stored for `scheme`.
pub fn seal(secret: &str, scheme: SecretScheme, iterations: u32) -> StoreResult<String> {
    match scheme {
        SecretScheme::Plain => Ok(secret.to_string()),
        SecretScheme::Pbkdf2 => {
            let iterations = NonZeroU32::new(iterations)
                .ok_or_else(|| StoreError::Secret("pbkdf2 iterations must be non-zero".into()))?;

            let mut salt = [0u8; SALT_LEN];
            SystemRandom::new()
                .fill(&mut salt)
                .map_err(|_| StoreError::Secret("failed to generate random salt".into()))?;

            let mut hash = [0u8; KEY_LEN];
            pbkdf2::derive(PBKDF2_ALG, iterations, &salt, secret.as_bytes(), &mut hash);

            Ok(format!(
                "{iterations}:{}:{}",
                BASE64.encode(salt),
                BASE64.encode(hash)
            ))
        }
    }
}

/// Check `candidate` against a value previously produced by [`seal`].
pub fn matches(stored: &str, scheme: SecretScheme, candidate: &str) -> StoreResult<bool> {
    match scheme {
        SecretScheme::Plain => Ok(stored == candidate),
        SecretScheme::Pbkdf2 => {
            let mut parts = stored.splitn(3, ':');
            let (Some(iterations), Some(salt), Some(hash)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(StoreError::Secret("malformed pbkdf2 secret".into()));
            };

            let iterations = iterations
                .parse::<u32>()
                .ok()
                .and_then(NonZeroU32::new)
                .ok_or_else(|| StoreError::Secret("invalid pbkdf2 iteration count".into()))?;
            let salt = BASE64
                .decode(salt)
                .map_err(|e| StoreError::Secret(format!("invalid salt encoding: {e}")))?;
            let hash = BASE64
                .decode(hash)
                .map_err(|e| StoreError::Secret(format!("invalid hash encoding: {e}")))?;

            Ok(pbkdf2::verify(PBKDF2_ALG, iterations, &salt, candidate.as_bytes(), &hash).is_ok())
        }
    }
}
