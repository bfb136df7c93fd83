//! User management.
//!
//! Admin operations take an `&AdminGrant`, which only the admin gate hands out. Inputs are
//! normalized and escaped here before they reach the store; passwords are hashed before a
//! store connection is taken so the table is never locked for the length of a hash.

use serde::Deserialize;

use super::authorizer::AdminGrant;
use super::principal::{Principal, Role, UserView};
use crate::audit;
use crate::error::{AppError, AppResult};
use crate::ident::{escape_markup, normalize_email, normalize_username};
use crate::security::{check_password_policy, CredentialHasher};
use crate::storage::{NewUser, SharedStore, UserPatch};

#[derive(Clone, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Every field is optional; absent fields are left as they are.
#[derive(Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

#[derive(Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

fn invalid(msg: &str) -> AppError {
    AppError::validation("validation_failed", msg)
}

fn parse_role(raw: &str) -> AppResult<Role> {
    Role::parse(raw).ok_or_else(|| invalid("unknown role"))
}

fn new_password_hash(hasher: &CredentialHasher, password: &str) -> AppResult<String> {
    check_password_policy(password).map_err(invalid)?;
    Ok(hasher.hash(password)?)
}

pub fn create_user(store: &SharedStore, hasher: &CredentialHasher, grant: &AdminGrant, req: CreateUserRequest) -> AppResult<UserView> {
    let username = normalize_username(&req.username).map_err(invalid)?;
    let role = match req.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => parse_role(raw)?,
        None => Role::DEFAULT,
    };
    let email = match req.email.as_deref() {
        Some(raw) => normalize_email(raw).map_err(invalid)?,
        None => None,
    };
    let full_name = req.full_name.as_deref().map(escape_markup).filter(|s| !s.is_empty());
    let password_hash = new_password_hash(hasher, &req.password)?;

    let rec = store.connect().insert(NewUser {
        username,
        full_name,
        email,
        password_hash,
        role: role.as_str().to_string(),
        disabled: false,
    })?;
    audit::admin_action(grant.actor(), "create_user", &rec.username);
    Ok(UserView::from(&rec))
}

pub fn list_users(store: &SharedStore, _grant: &AdminGrant) -> Vec<UserView> {
    store.connect().list().iter().map(UserView::from).collect()
}

pub fn update_user(store: &SharedStore, hasher: &CredentialHasher, grant: &AdminGrant, id: u64, req: UpdateUserRequest) -> AppResult<UserView> {
    let mut patch = UserPatch {
        full_name: req.full_name.as_deref().map(escape_markup).filter(|s| !s.is_empty()),
        disabled: req.disabled,
        ..Default::default()
    };
    if let Some(raw) = req.email.as_deref() {
        patch.email = normalize_email(raw).map_err(invalid)?;
    }
    if let Some(raw) = req.role.as_deref() {
        patch.role = Some(parse_role(raw)?.as_str().to_string());
    }
    if let Some(pw) = req.password.as_deref() {
        patch.password_hash = Some(new_password_hash(hasher, pw)?);
    }

    // Nothing to change: report the row as it is and leave no audit trail.
    if patch.is_empty() {
        let rec = store.connect().find_by_id(id).ok_or_else(AppError::user_not_found)?;
        return Ok(UserView::from(&rec));
    }
    let rec = store.connect().update(id, patch)?;
    audit::admin_action(grant.actor(), "update_user", &rec.username);
    Ok(UserView::from(&rec))
}

pub fn delete_user(store: &SharedStore, grant: &AdminGrant, id: u64) -> AppResult<()> {
    if grant.principal().id() == id {
        audit::forbidden(grant.actor(), "delete_self");
        return Err(AppError::forbidden("self_delete", "administrators cannot delete their own account"));
    }
    let removed = store.connect().delete(id)?;
    audit::admin_action(grant.actor(), "delete_user", &removed.username);
    Ok(())
}

/// Self-service password change. The current password must verify against the stored hash.
pub fn change_own_password(store: &SharedStore, hasher: &CredentialHasher, who: &Principal, req: ChangePasswordRequest) -> AppResult<()> {
    let current = store.connect().find_by_id(who.id()).ok_or_else(AppError::bad_token)?;
    if !hasher.verify(&req.old_password, &current.password_hash) {
        audit::password_change_rejected(who.username());
        return Err(invalid("current password is incorrect"));
    }
    let password_hash = new_password_hash(hasher, &req.new_password)?;
    store.connect().update(who.id(), UserPatch { password_hash: Some(password_hash), ..Default::default() })?;
    audit::password_changed(who.username());
    Ok(())
}
