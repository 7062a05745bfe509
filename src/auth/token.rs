//! Signed bearer tokens (HS256 JWT)
//!
//! Wire form: `base64url(header).base64url(payload).base64url(signature)`,
//! payload `{"sub", "role", "iat", "exp"}` with Unix-second timestamps.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::TokenError, models::user::Role};

/// Minimum HMAC-SHA256 key size in bytes
pub const MIN_KEY_LEN: usize = 32;

/// Token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Verified content of a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub subject: String,
    /// Role at issuance; informational only, the directory has the final say
    pub role_claim: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl DecodedToken {
    pub fn role(&self) -> Option<Role> {
        self.role_claim.parse().ok()
    }
}

/// Encodes and verifies tokens with a symmetric key checked at construction
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from a base64 secret (standard or URL-safe alphabet,
    /// padding optional).
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        let key = decode_secret(secret)?;
        Self::from_key_bytes(&key)
    }

    /// Build a codec from raw key material
    pub fn from_key_bytes(key: &[u8]) -> Result<Self, TokenError> {
        if key.len() < MIN_KEY_LEN {
            return Err(TokenError::KeyConfiguration(format!(
                "signing key is {} bytes, at least {} required",
                key.len(),
                MIN_KEY_LEN
            )));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is judged against the caller's clock in `decode_at`
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
        })
    }

    /// Issue a token valid for `ttl` from now
    pub fn encode(&self, subject: &str, role: Role, ttl: Duration) -> Result<String, TokenError> {
        self.encode_at(subject, role, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn encode_at(
        &self,
        subject: &str,
        role: Role,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            role: role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(map_jwt_error)
    }

    /// Verify a token against the current time
    pub fn decode(&self, token: &str) -> Result<DecodedToken, TokenError> {
        self.decode_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`.
    ///
    /// The signature is checked before expiry, so a forged expired token
    /// reports `SignatureInvalid`.
    pub fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<DecodedToken, TokenError> {
        let parts = token.split('.').count();
        if parts != 3 {
            return Err(TokenError::Malformed(format!("expected 3 segments, found {}", parts)));
        }

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(DecodedToken {
            subject: claims.sub,
            role_claim: claims.role,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, TokenError> {
    let trimmed = secret.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(TokenError::KeyConfiguration("signing secret is empty".to_string()));
    }

    general_purpose::STANDARD_NO_PAD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
        .map_err(|e| TokenError::KeyConfiguration(format!("signing secret is not valid base64: {}", e)))
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::SignatureInvalid
        }
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidKeyFormat | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey => {
            TokenError::KeyConfiguration(e.to_string())
        }
        _ => TokenError::Malformed(e.to_string()),
    }
}
