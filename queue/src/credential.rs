//! Bearer-token lifecycle for the queue connection.
//!
//! A configured token is validated locally against a fixed ES384 public key. A
//! token that verifies but has expired is exchanged once for a fresh one at the
//! refresh endpoint. Every other validation failure is final.
//!
//! The flow is driven by [`CredentialState`]:
//!
//! ```text
//! Unchecked --valid--> Valid
//!     |  \--invalid--> Failed
//!     \--expired--> Expired --> Refreshing --ok--> Unchecked (refreshed) --> Valid | Failed
//!                                     \--error--> Failed
//! ```

use base64::{
    engine::general_purpose::URL_SAFE_NO_PAD,
    Engine as _,
};
use chrono::{
    DateTime,
    Utc,
};
use futures::{
    future::BoxFuture,
    FutureExt as _,
};
use p384::{
    ecdsa::{
        signature::Verifier as _,
        Signature,
        VerifyingKey,
    },
    pkcs8::DecodePublicKey as _,
};
use serde::Deserialize;
use std::{
    fmt,
    sync::{
        Mutex,
        PoisonError,
    },
    time::Duration,
};
use url::Url;

/// Signing algorithm accepted for queue tokens.
pub const ALGORITHM: &str = "ES384";

/// Public key the queue tokens are signed with.
pub const DEFAULT_PUBLIC_KEY_PEM: &str = "\
-----BEGIN PUBLIC KEY-----
MHYwEAYHKoZIzj0CAQYFK4EEACIDYgAES5X8XrfKdx9gYayFITc89wad4usrk0n2
7MjiGYvqalizeSWTHEpnd7oea9IQ8T5oJjMVH5cc0H5tFSKilFFeh//wngxIyny6
6+Vq5t5B0V0Ehy01+2ceEon2Y0XDkIKv
-----END PUBLIC KEY-----
";

pub const DEFAULT_REFRESH_URL: &str = "https://itsyou.online/v1/oauth/jwt/refresh?validity=3600";

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("invalid token verification key: {0}")]
    Key(String),
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token refresh request failed")]
    RefreshRequest(#[source] reqwest::Error),
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Why a token did not validate.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Signature is good, but the token expired at the given instant.
    #[error("token expired at {expired_at}")]
    NeedsRefresh { expired_at: DateTime<Utc> },
    #[error("{0}")]
    Invalid(String),
}

/// A token that verified, together with its decoded expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token_len", &self.token.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Checks compact JWS tokens against one ES384 public key.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key: VerifyingKey,
}

impl TokenVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse a PEM-encoded SubjectPublicKeyInfo.
    pub fn from_pem(pem: &str) -> Result<Self, CredentialError> {
        let key = VerifyingKey::from_public_key_pem(pem).map_err(|e| CredentialError::Key(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn validate(&self, token: &str) -> Result<Credential, ValidationFailure> {
        self.validate_at(token, Utc::now())
    }

    /// Signature and algorithm are checked before expiry, so a forged or
    /// foreign token is always `Invalid`, never `NeedsRefresh`.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Credential, ValidationFailure> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ValidationFailure::Invalid("token is not a compact JWS".to_string()));
        };

        let header: Header = decode_segment(header, "header")?;
        if header.alg != ALGORITHM {
            return Err(ValidationFailure::Invalid(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|e| ValidationFailure::Invalid(format!("signature encoding: {e}")))?;
        let signature =
            Signature::from_slice(&signature).map_err(|e| ValidationFailure::Invalid(format!("signature: {e}")))?;
        let signing_input = token.rsplit_once('.').map(|(input, _)| input).unwrap_or_default();
        self.key
            .verify(signing_input.as_bytes(), &signature)
            .map_err(|_| ValidationFailure::Invalid("signature verification failed".to_string()))?;

        let claims: Claims = decode_segment(claims, "claims")?;
        let expires_at = match claims.exp {
            Some(exp) => Some(
                DateTime::from_timestamp(exp as i64, 0)
                    .ok_or_else(|| ValidationFailure::Invalid(format!("expiry {exp} out of range")))?,
            ),
            None => None,
        };

        if let Some(expired_at) = expires_at.filter(|exp| now > *exp) {
            return Err(ValidationFailure::NeedsRefresh { expired_at });
        }

        Ok(Credential {
            token: token.to_string(),
            expires_at,
        })
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> Result<T, ValidationFailure> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| ValidationFailure::Invalid(format!("{what} encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ValidationFailure::Invalid(format!("{what}: {e}")))
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Exchanges an expired token for a new one.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, CredentialError>>;
}

/// Refreshes tokens with `POST <url>` authenticated by the expired token.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    client: reqwest::Client,
    url: Url,
}

impl HttpRefresher {
    pub fn new(url: Url) -> Result<Self, CredentialError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(CredentialError::RefreshRequest)?;
        Ok(Self { client, url })
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<String, CredentialError>> {
        async move {
            debug!(url = %self.url, "refreshing queue token");
            let response = self
                .client
                .post(self.url.clone())
                .header(reqwest::header::AUTHORIZATION, format!("bearer {token}"))
                .send()
                .await
                .map_err(CredentialError::RefreshRequest)?
                .error_for_status()
                .map_err(CredentialError::RefreshRequest)?;
            let body = response.text().await.map_err(CredentialError::RefreshRequest)?;
            let refreshed = body.trim();
            if refreshed.is_empty() {
                return Err(CredentialError::RefreshFailed("refresh endpoint returned an empty body".to_string()));
            }
            Ok(refreshed.to_string())
        }
        .boxed()
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Where a token is in its validate/refresh lifecycle.
#[derive(Debug)]
pub enum CredentialState {
    Unchecked { token: String, refreshed: bool },
    Valid(Credential),
    Expired {
        token: String,
        expired_at: DateTime<Utc>,
        refreshed: bool,
    },
    Refreshing { token: String },
    Failed(CredentialError),
}

impl CredentialState {
    pub fn new(token: impl Into<String>) -> Self {
        CredentialState::Unchecked {
            token: token.into(),
            refreshed: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CredentialState::Valid(_) | CredentialState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            CredentialState::Unchecked { .. } => "unchecked",
            CredentialState::Valid(_) => "valid",
            CredentialState::Expired { .. } => "expired",
            CredentialState::Refreshing { .. } => "refreshing",
            CredentialState::Failed(_) => "failed",
        }
    }
}

/// Owns the token of one connection pool and produces a valid credential on demand.
pub struct CredentialManager<R = HttpRefresher> {
    verifier: TokenVerifier,
    refresher: R,
    token: Mutex<String>,
}

impl<R> fmt::Debug for CredentialManager<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

impl<R: TokenRefresher> CredentialManager<R> {
    pub fn new(token: impl Into<String>, verifier: TokenVerifier, refresher: R) -> Self {
        Self {
            verifier,
            refresher,
            token: Mutex::new(token.into()),
        }
    }

    pub fn validate(&self, token: &str) -> Result<Credential, ValidationFailure> {
        self.verifier.validate(token)
    }

    pub async fn refresh(&self, token: &str) -> Result<String, CredentialError> {
        self.refresher.refresh(token).await
    }

    /// The token the next connection will authenticate with.
    pub fn current_token(&self) -> String {
        self.token.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Perform one transition.
    pub async fn advance(&self, state: CredentialState) -> CredentialState {
        match state {
            CredentialState::Unchecked { token, refreshed } => match self.validate(&token) {
                Ok(credential) => CredentialState::Valid(credential),
                Err(ValidationFailure::NeedsRefresh { expired_at }) => CredentialState::Expired {
                    token,
                    expired_at,
                    refreshed,
                },
                Err(ValidationFailure::Invalid(reason)) => CredentialState::Failed(CredentialError::Invalid(reason)),
            },
            CredentialState::Expired {
                token,
                refreshed: false,
                expired_at,
            } => {
                info!(%expired_at, "queue token expired, refreshing");
                CredentialState::Refreshing { token }
            }
            CredentialState::Expired {
                refreshed: true,
                expired_at,
                ..
            } => CredentialState::Failed(CredentialError::RefreshFailed(format!(
                "refreshed token is already expired ({expired_at})"
            ))),
            CredentialState::Refreshing { token } => match self.refresh(&token).await {
                Ok(token) => CredentialState::Unchecked { token, refreshed: true },
                Err(err) => CredentialState::Failed(err),
            },
            terminal @ (CredentialState::Valid(_) | CredentialState::Failed(_)) => terminal,
        }
    }

    /// Run the lifecycle for the current token. A refreshed token replaces the
    /// stored one so later connections start from it.
    pub async fn credential(&self) -> Result<Credential, CredentialError> {
        let mut state = CredentialState::new(self.current_token());
        loop {
            state = match state {
                CredentialState::Valid(credential) => {
                    *self.token.lock().unwrap_or_else(PoisonError::into_inner) = credential.token.clone();
                    debug!(expires_at = ?credential.expires_at, "queue token valid");
                    return Ok(credential);
                }
                CredentialState::Failed(err) => return Err(err),
                pending => {
                    trace!(state = pending.name(), "advancing credential state");
                    self.advance(pending).await
                }
            };
        }
    }
}
