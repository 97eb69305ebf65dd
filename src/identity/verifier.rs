//! External identity verification.
//!
//! The sign-in page hands us an ID token from the identity provider. A
//! verifier turns that opaque string into a `VerifiedIdentity` restricted to
//! the school's domain, or a typed failure.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AppError;

/// Who the identity provider says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("not signed in: {0}")]
    InvalidToken(String),
    #[error("that account isn't associated with {0}")]
    WrongDomain(String),
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match &err {
            VerifyError::InvalidToken(_) => AppError::authentication("identity_invalid_token".to_string(), err.to_string()),
            VerifyError::WrongDomain(_) => AppError::authentication("identity_wrong_domain".to_string(), err.to_string()),
            VerifyError::Unreachable(_) => AppError::upstream("identity_unreachable".to_string(), err.to_string()),
        }
    }
}

pub trait IdentityVerifier: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>>;
}

/// Fields of the provider's token-info document that we look at.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Hosted domain of the account.
    #[serde(default)]
    pub hd: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// Validate a decoded token-info document against the allowed domain and,
/// when configured, the expected audience.
pub fn check_token_info(info: TokenInfo, domain: &str, client_id: Option<&str>) -> Result<VerifiedIdentity, VerifyError> {
    if let Some(err) = info.error {
        let reason = info.error_description.unwrap_or(err);
        return Err(VerifyError::InvalidToken(reason));
    }
    if info.hd.as_deref() != Some(domain) {
        return Err(VerifyError::WrongDomain(domain.to_string()));
    }
    if let Some(expected) = client_id {
        if info.aud.as_deref() != Some(expected) {
            return Err(VerifyError::InvalidToken("token was issued for another application".into()));
        }
    }
    let email = info.email.unwrap_or_default().trim().to_string();
    if email.is_empty() {
        return Err(VerifyError::InvalidToken("token carries no email".into()));
    }
    let name = info.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()).unwrap_or_else(|| email.clone());
    Ok(VerifiedIdentity { email, name })
}

/// Verifies Google ID tokens through the token-info endpoint.
pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    endpoint: String,
    domain: String,
    client_id: Option<String>,
}

impl GoogleTokenVerifier {
    pub fn new(endpoint: &str, domain: &str, client_id: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, endpoint: endpoint.to_string(), domain: domain.to_string(), client_id })
    }

    async fn fetch(&self, token: &str) -> Result<VerifiedIdentity, VerifyError> {
        if token.trim().is_empty() {
            return Err(VerifyError::InvalidToken("missing token".into()));
        }
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| VerifyError::Unreachable(e.to_string()))?;
        let status = resp.status();
        // the endpoint answers 400 with an `error` document for bad tokens
        let info: TokenInfo = resp.json().await.map_err(|e| {
            warn!(target: "service_hours::identity", %status, error = %e, "undecodable token-info response");
            VerifyError::Unreachable(format!("HTTP {status}"))
        })?;
        let out = check_token_info(info, &self.domain, self.client_id.as_deref());
        if let Ok(id) = &out {
            debug!(target: "service_hours::identity", email = %id.email, "token verified");
        }
        out
    }
}

impl IdentityVerifier for GoogleTokenVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>> {
        Box::pin(self.fetch(token))
    }
}

/// Fixed token table; used by tests and local development.
#[derive(Default, Clone)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, Result<VerifiedIdentity, VerifyError>>,
}

impl StaticIdentityVerifier {
    pub fn new() -> Self { Self::default() }

    pub fn with_identity(mut self, token: &str, email: &str, name: &str) -> Self {
        self.tokens.insert(token.to_string(), Ok(VerifiedIdentity { email: email.into(), name: name.into() }));
        self
    }

    pub fn with_failure(mut self, token: &str, err: VerifyError) -> Self {
        self.tokens.insert(token.to_string(), Err(err));
        self
    }
}

impl IdentityVerifier for StaticIdentityVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<VerifiedIdentity, VerifyError>> {
        let out = self
            .tokens
            .get(token)
            .cloned()
            .unwrap_or_else(|| Err(VerifyError::InvalidToken("invalid_token".into())));
        Box::pin(async move { out })
    }
}
