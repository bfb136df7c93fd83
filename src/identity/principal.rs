use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::UserRecord;

/// Roles recognized by the access gates. Stored role strings outside this set are kept
/// verbatim in the table but grant nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    Solicitante,
}

impl Role {
    /// Least-privileged role, assigned when none is given.
    pub const DEFAULT: Role = Role::Solicitante;

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Supervisor => "supervisor",
            Role::Solicitante => "solicitante",
        }
    }

    /// Case-insensitive; `user` is the legacy spelling of the default role.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "supervisor" => Some(Role::Supervisor),
            "solicitante" | "user" => Some(Role::Solicitante),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| format!("unknown role '{s}'"))
    }
}

/// Outward representation of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub id: u64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub disabled: bool,
}

impl From<&UserRecord> for UserView {
    fn from(rec: &UserRecord) -> Self {
        Self {
            id: rec.id,
            username: rec.username.clone(),
            full_name: rec.full_name.clone(),
            email: rec.email.clone(),
            role: rec.role.clone(),
            disabled: rec.disabled,
        }
    }
}

/// The caller of the current request, as loaded from the store for this request only.
#[derive(Debug, Clone)]
pub struct Principal {
    record: UserRecord,
    role: Option<Role>,
}

impl Principal {
    pub fn from_record(record: UserRecord) -> Self {
        let role = Role::parse(&record.role);
        Self { record, role }
    }

    pub fn id(&self) -> u64 { self.record.id }
    pub fn username(&self) -> &str { &self.record.username }

    /// `None` when the stored role is not one we recognize.
    pub fn role(&self) -> Option<Role> { self.role }

    pub fn is_admin(&self) -> bool { self.role == Some(Role::Admin) }

    pub fn record(&self) -> &UserRecord { &self.record }

    pub fn view(&self) -> UserView { UserView::from(&self.record) }
}
