use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::verifier::IdentityVerifier;
use crate::directory::{User, UserDirectory};
use crate::error::{AppError, AppResult};

pub type SessionToken = String;

const TOKEN_BYTES: usize = 32;
const MAX_ISSUE_ATTEMPTS: usize = 8;

fn gen_token() -> AppResult<SessionToken> {
    // 256-bit random token, base64url without padding
    let mut buf = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut buf)
        .map_err(|e| AppError::internal("token_entropy".to_string(), e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Token -> user map for signed-in browsers.
///
/// Each session holds a copy of the user record taken at sign-in; later
/// directory changes (including the admin flag) are not seen until the user
/// signs in again. Sessions do not expire.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionToken, User>>>,
}

impl SessionRegistry {
    pub fn new() -> Self { Self::default() }

    /// Map a fresh token to a copy of `user`.
    pub fn issue(&self, user: &User) -> AppResult<SessionToken> {
        // draw and claim under the same write lock so two issuers never share a token
        let mut map = self.sessions.write();
        for _ in 0..MAX_ISSUE_ATTEMPTS {
            let token = gen_token()?;
            if let Entry::Vacant(slot) = map.entry(token.clone()) {
                slot.insert(user.clone());
                info!(target: "service_hours::session", email = %user.email, admin = user.admin, "session issued");
                return Ok(token);
            }
            warn!(target: "service_hours::session", "session token collision, redrawing");
        }
        Err(AppError::internal("token_collision".to_string(), "could not draw a unique session token".to_string()))
    }

    /// Verify an external identity token, resolve it against the directory
    /// and open a session for the resulting user.
    pub async fn issue_from_identity(
        &self,
        external_token: &str,
        verifier: &dyn IdentityVerifier,
        directory: &UserDirectory,
    ) -> AppResult<(SessionToken, User)> {
        let identity = verifier.verify(external_token).await.map_err(|e| {
            warn!(target: "service_hours::session", error = %e, "identity verification failed");
            AppError::from(e)
        })?;
        let user = directory.resolve_identity(&identity)?;
        let token = self.issue(&user)?;
        Ok((token, user))
    }

    pub fn lookup(&self, token: &str) -> Option<User> {
        self.sessions.read().get(token).cloned()
    }

    /// Forget a token. Unknown tokens are ignored; returns whether one was removed.
    pub fn remove(&self, token: &str) -> bool {
        let removed = self.sessions.write().remove(token);
        if let Some(user) = &removed {
            debug!(target: "service_hours::session", email = %user.email, "session removed");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }
}
