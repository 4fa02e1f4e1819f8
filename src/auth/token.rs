//! Signed API keys.
//!
//! An API key is `urlsafe_base64("{subject}:{expiry}:{signature}")`, where the
//! signature is the lowercase hex HMAC-SHA256 of `"{subject}:{expiry}"` under
//! the process secret. Keys are not encrypted: anyone holding one can read the
//! subject and expiry. Only the signature resists forgery.
//!
//! Nothing is stored server-side. Every verification re-derives the signature
//! from the decoded fields, so a key lives until its expiry passes (or the
//! secret changes). An expiry of [`UNLIMITED`] never passes.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Seconds added to the issue time per day of validity.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Expiry sentinel for keys that never expire.
pub const UNLIMITED: i64 = 0;

/// Secrets shorter than this are refused at startup unless explicitly allowed.
pub const MIN_SECRET_LEN: usize = 32;

/// URL-safe alphabet. Padded on encode, padding optional on decode.
const KEY_ENCODING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Errors from [`TokenAuthority::issue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("service does not provide a secret key")]
    MissingSecret,
    #[error("subject must not contain ':'")]
    InvalidSubject,
}

/// The process-wide signing key. Wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Whether a configured secret is too short to sign keys with.
pub fn is_weak_secret(secret: &str) -> bool {
    secret.len() < MIN_SECRET_LEN
}

/// Identity proven by a valid key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: String,
    /// Unix seconds, or [`UNLIMITED`].
    pub expiry: i64,
}

impl TokenClaims {
    pub fn is_unlimited(&self) -> bool {
        self.expiry == UNLIMITED
    }
}

/// Outcome of verifying a presented key.
///
/// Every decode anomaly collapses into `Invalid`; callers match exhaustively
/// and there is no error path that could let a request through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(TokenClaims),
    /// Forged, corrupt, or malformed.
    Invalid,
    /// Well-formed but past its expiry.
    Expired,
    /// No secret key is configured, so nothing can be verified.
    MissingSecret,
}

impl Verification {
    /// Static label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::MissingSecret => "missing_secret",
        }
    }
}

/// Issues and verifies API keys.
///
/// Holds nothing but the immutable secret, so one instance can be shared by
/// every request handler without locking.
#[derive(Debug, Clone, Default)]
pub struct TokenAuthority {
    secret: Option<SecretKey>,
}

impl TokenAuthority {
    /// An empty secret is treated the same as no secret.
    pub fn new(secret: Option<SecretKey>) -> Self {
        Self {
            secret: secret.filter(|s| !s.0.is_empty()),
        }
    }

    pub fn from_secret(secret: Option<&str>) -> Self {
        Self::new(secret.map(|s| SecretKey::new(s.as_bytes())))
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Issue a key for `subject` valid for `ttl_days` from now, or forever when
    /// `unlimited` is set.
    pub fn issue(&self, subject: &str, ttl_days: u32, unlimited: bool) -> Result<String, TokenError> {
        self.issue_at(subject, ttl_days, unlimited, now())
    }

    /// [`issue`](Self::issue) against an explicit clock reading.
    pub fn issue_at(
        &self,
        subject: &str,
        ttl_days: u32,
        unlimited: bool,
        now: i64,
    ) -> Result<String, TokenError> {
        let secret = self.secret.as_ref().ok_or(TokenError::MissingSecret)?;
        if subject.contains(':') {
            return Err(TokenError::InvalidSubject);
        }

        let expiry = if unlimited {
            UNLIMITED
        } else {
            now.saturating_add(i64::from(ttl_days) * SECONDS_PER_DAY)
        };
        let signature = sign(secret, subject, expiry);
        Ok(KEY_ENCODING.encode(format!("{subject}:{expiry}:{signature}")))
    }

    pub fn verify(&self, token: &str) -> Verification {
        self.verify_at(token, now())
    }

    /// [`verify`](Self::verify) against an explicit clock reading.
    ///
    /// Expiry is checked before the signature, so an expired key reports
    /// `Expired` whether or not its signature holds.
    pub fn verify_at(&self, token: &str, now: i64) -> Verification {
        let Some(secret) = self.secret.as_ref() else {
            return Verification::MissingSecret;
        };
        let Some(decoded) = decode(token) else {
            return Verification::Invalid;
        };

        if decoded.expiry != UNLIMITED && decoded.expiry < now {
            return Verification::Expired;
        }

        let expected = sign(secret, &decoded.subject, decoded.expiry);
        if bool::from(expected.as_bytes().ct_eq(decoded.signature.as_bytes())) {
            Verification::Valid(TokenClaims {
                subject: decoded.subject,
                expiry: decoded.expiry,
            })
        } else {
            Verification::Invalid
        }
    }
}

struct DecodedKey {
    subject: String,
    expiry: i64,
    signature: String,
}

fn decode(token: &str) -> Option<DecodedKey> {
    let bytes = KEY_ENCODING.decode(token).ok()?;
    let text = String::from_utf8(bytes).ok()?;

    let mut fields = text.split(':');
    let subject = fields.next()?;
    let expiry = fields.next()?;
    let signature = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    Some(DecodedKey {
        subject: subject.to_string(),
        expiry: expiry.parse().ok()?,
        signature: signature.to_string(),
    })
}

fn sign(secret: &SecretKey, subject: &str, expiry: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(subject.as_bytes());
    mac.update(b":");
    mac.update(expiry.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
