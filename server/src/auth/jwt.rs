use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, AuthError};
use crate::roles::permissions::Role;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Access token claims. `sub` is the numeric user id as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Result of a successful credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: i64,
    /// Role at issuance time. Authorization re-reads the stored role.
    pub role: Role,
}

/// Stateless bearer-credential verifier shared by the HTTP extractor and the join handshake.
#[derive(Clone)]
pub struct IdentityVerifier {
    secret: Arc<Vec<u8>>,
    token_ttl_secs: i64,
}

impl IdentityVerifier {
    pub fn new(secret: Vec<u8>, token_ttl_secs: i64) -> Self {
        Self {
            secret: Arc::new(secret),
            token_ttl_secs,
        }
    }

    /// Issue an HS256 access token for a user.
    pub fn issue(&self, user_id: i64, role: Role) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + self.token_ttl_secs,
        };
        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::default(), claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| ApiError::Upstream(format!("token encoding: {}", e)))
    }

    /// Verify a bearer credential. Rejects malformed, tampered and expired tokens.
    pub fn verify(&self, credential: &str) -> Result<VerifiedIdentity, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::Missing);
        }
        let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        let data = decode::<Claims>(credential, &DecodingKey::from_secret(&self.secret), &validation)?;
        let user_id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::Invalid)?;
        Ok(VerifiedIdentity {
            user_id,
            role: data.claims.role,
        })
    }
}
