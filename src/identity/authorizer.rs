//! Access control gates.
//!
//! A gate turns the raw `Authorization` header into a `Principal` (authenticated gate) or
//! into an `AdminGrant` (admin gate). Operations that need admin rights take an
//! `&AdminGrant`, so they cannot be called without the gate having admitted the caller.

use axum::http::{header, HeaderMap};

use super::principal::Principal;
use super::resolver::resolve;
use super::token::TokenIssuer;
use crate::audit;
use crate::error::{AppError, AppResult};
use crate::storage::SharedStore;

/// Proof that the admin gate admitted the caller for this request.
#[derive(Debug, Clone)]
pub struct AdminGrant {
    principal: Principal,
}

impl AdminGrant {
    pub fn principal(&self) -> &Principal { &self.principal }
    pub fn actor(&self) -> &str { self.principal.username() }
}

/// Extract the token from `Authorization: Bearer <token>`. The scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") { return None; }
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Authenticated gate: any live, enabled user holding a valid token.
///
/// Every failure (no header, bad token, user gone or disabled) yields the same 401; the
/// specific cause only goes to the debug log.
pub fn admit_authenticated(tokens: &TokenIssuer, store: &SharedStore, bearer: Option<&str>) -> AppResult<Principal> {
    let Some(raw) = bearer else {
        tracing::debug!("request without bearer token");
        return Err(AppError::bad_token());
    };
    let validated = tokens.validate(raw).map_err(|kind| {
        tracing::debug!(reason = %kind, "token rejected");
        AppError::bad_token()
    })?;
    // Only the subject is taken from the token; the role claim is ignored here.
    resolve(store, &validated.subject).map_err(|why| {
        tracing::debug!(subject = %validated.subject, reason = %why, "token subject not resolvable");
        AppError::bad_token()
    })
}

/// Admin gate: authenticated gate plus `role == admin` as currently stored.
pub fn admit_admin(tokens: &TokenIssuer, store: &SharedStore, bearer: Option<&str>, action: &str) -> AppResult<AdminGrant> {
    let principal = admit_authenticated(tokens, store, bearer)?;
    grant_admin(principal, action)
}

pub fn grant_admin(principal: Principal, action: &str) -> AppResult<AdminGrant> {
    if principal.is_admin() {
        Ok(AdminGrant { principal })
    } else {
        audit::forbidden(principal.username(), action);
        Err(AppError::insufficient_role())
    }
}
