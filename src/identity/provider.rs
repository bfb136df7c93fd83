use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Instant};

use super::token::{TokenIssuer, TOKEN_TYPE};
use crate::audit;
use crate::error::{AppError, AppResult};
use crate::security::CredentialHasher;
use crate::storage::{SharedStore, UserPatch, UserRecord};

#[derive(Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest").field("username", &self.username).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Why a credential check was rejected. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    UnknownUser,
    WrongPassword,
    Disabled,
}

impl Rejection {
    fn reason(self) -> &'static str {
        match self {
            Rejection::UnknownUser => "unknown_user",
            Rejection::WrongPassword => "wrong_password",
            Rejection::Disabled => "account_disabled",
        }
    }
}

/// Password login against the local user table.
///
/// Rejected attempts never complete before `floor` has elapsed since the attempt started, so
/// an unknown username and a wrong password cost the caller the same wall-clock time.
pub struct LocalAuthProvider {
    store: SharedStore,
    hasher: CredentialHasher,
    tokens: Arc<TokenIssuer>,
    floor: Duration,
}

impl LocalAuthProvider {
    pub fn new(store: SharedStore, hasher: CredentialHasher, tokens: Arc<TokenIssuer>, floor: Duration) -> Self {
        Self { store, hasher, tokens, floor }
    }

    pub fn floor(&self) -> Duration { self.floor }

    pub async fn login(&self, req: LoginRequest) -> AppResult<LoginResponse> {
        let started = Instant::now();
        let username = req.username.trim().to_string();

        // Hashing is CPU bound; keep it off the async workers.
        let checked = {
            let store = self.store.clone();
            let hasher = self.hasher.clone();
            let username = username.clone();
            tokio::task::spawn_blocking(move || check_credentials(&store, &hasher, &username, &req.password))
                .await
                .map_err(|e| anyhow!("credential check task failed: {e}"))?
        };

        match checked {
            Ok(user) => {
                let access_token = self.tokens.issue(&user.username, &user.role)?;
                audit::login_succeeded(&user.username, &user.role);
                Ok(LoginResponse { access_token, token_type: TOKEN_TYPE.to_string() })
            }
            Err(why) => {
                audit::login_rejected(&username, why.reason());
                // No store connection is held here; only this request waits.
                match started.checked_add(self.floor) {
                    Some(deadline) => sleep_until(deadline).await,
                    None => tracing::warn!(floor = ?self.floor, "login floor out of range; not padding"),
                }
                Err(AppError::bad_credentials())
            }
        }
    }
}

fn check_credentials(store: &SharedStore, hasher: &CredentialHasher, username: &str, password: &str) -> Result<UserRecord, Rejection> {
    let Some(user) = store.connect().find_by_username(username) else {
        return Err(Rejection::UnknownUser);
    };
    if !hasher.verify(password, &user.password_hash) {
        return Err(Rejection::WrongPassword);
    }
    if user.disabled {
        return Err(Rejection::Disabled);
    }
    if hasher.needs_rehash(&user.password_hash) {
        upgrade_hash(store, hasher, &user, password);
    }
    Ok(user)
}

/// Replace a legacy hash after a successful login. Failure here does not fail the login.
fn upgrade_hash(store: &SharedStore, hasher: &CredentialHasher, user: &UserRecord, password: &str) {
    let fresh = match hasher.hash(password) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(username = %user.username, "could not rehash legacy password: {e}");
            return;
        }
    };
    let patch = UserPatch { password_hash: Some(fresh), ..Default::default() };
    match store.connect().update(user.id, patch) {
        Ok(_) => tracing::info!(username = %user.username, "legacy password hash upgraded to argon2id"),
        Err(e) => tracing::warn!(username = %user.username, "could not store upgraded hash: {e}"),
    }
}
