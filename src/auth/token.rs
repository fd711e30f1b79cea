use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ConfigError},
    models::Role,
};

/// Fixed lifetime of every session token.
pub const TOKEN_TTL_DAYS: i64 = 30;

/// Claims
///
/// The payload signed into every session token. There is no server-side session
/// record; expiry is the only way a token stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Claims {
    /// The authenticated user's id.
    pub user_id: Uuid,
    /// The role at issuance time.
    pub role: Role,
    /// Issued At, seconds since the epoch.
    pub iat: i64,
    /// Expiration Time, seconds since the epoch.
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// A freshly signed token together with its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// TokenService
///
/// The only component allowed to mint tokens. The signing secret is injected at
/// construction and never changes afterwards.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// Builds the service from the configured secret. An empty secret is rejected
    /// here so that startup fails instead of the first login.
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        if secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // No grace period past `exp`.
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "iat"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::days(TOKEN_TTL_DAYS),
        })
    }

    /// Signs a token for `user_id`/`role`, valid for 30 days from now.
    pub fn issue_token(&self, user_id: Uuid, role: Role) -> AppResult<IssuedToken> {
        self.issue_token_at(user_id, role, Utc::now())
    }

    /// Same as [`issue_token`](Self::issue_token) with an explicit issuance instant.
    pub fn issue_token_at(
        &self,
        user_id: Uuid,
        role: Role,
        issued_at: DateTime<Utc>,
    ) -> AppResult<IssuedToken> {
        let expires_at = issued_at + self.ttl;
        let claims = Claims {
            user_id,
            role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Verifies signature and expiry. Every failure is `Unauthenticated`.
    pub fn validate_token(&self, token: &str) -> AppResult<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidSignature => "bad token signature",
                    _ => "malformed token",
                };
                tracing::debug!(error = %e, "token rejected: {reason}");
                Err(AppError::Unauthenticated(reason.to_string()))
            }
        }
    }
}
