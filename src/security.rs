use anyhow::{Result, anyhow};
use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};

use crate::config::{BootstrapAdmin, HashingConfig};
use crate::ident::{escape_markup, normalize_email, normalize_username};
use crate::identity::Role;
use crate::storage::{NewUser, SharedStore};

/// One-way password hashing.
///
/// New hashes are always Argon2id PHC strings. Verification additionally accepts bcrypt
/// hashes (`$2a$`, `$2b$`, `$2y$`) left behind by the previous deployment.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self { argon2: Argon2::default() }
    }
}

fn is_legacy_bcrypt(stored: &str) -> bool {
    stored.starts_with("$2a$") || stored.starts_with("$2b$") || stored.starts_with("$2y$")
}

impl CredentialHasher {
    pub fn new(cfg: &HashingConfig) -> Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.lanes, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
        let phc = self.argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
        Ok(phc)
    }

    /// Never errors: an unparseable stored hash simply does not verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        if is_legacy_bcrypt(stored) {
            return bcrypt::verify(password, stored).unwrap_or(false);
        }
        if let Ok(parsed) = PasswordHash::new(stored) {
            // Cost parameters come from the PHC string, not from our own config.
            self.argon2.verify_password(password.as_bytes(), &parsed).is_ok()
        } else { false }
    }

    /// True when `stored` was produced by a scheme we no longer issue.
    pub fn needs_rehash(&self, stored: &str) -> bool {
        is_legacy_bcrypt(stored)
    }
}

pub const MIN_PASSWORD_LEN: usize = 8;

/// Rules applied to every new password (provisioning, admin reset, self change).
/// Returns the first rule that is violated.
pub fn check_password_policy(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < MIN_PASSWORD_LEN { return Err("password must be at least 8 characters long"); }
    if password.chars().any(char::is_whitespace) { return Err("password must not contain whitespace"); }
    if !password.chars().any(|c| c.is_ascii_digit()) { return Err("password must contain at least one digit"); }
    if !password.chars().any(char::is_uppercase) { return Err("password must contain at least one uppercase letter"); }
    Ok(())
}

/// Seed the configured admin account into an empty user table.
///
/// Returns `Ok(true)` when a row was inserted. A table that already has users is left
/// alone, so restarting with the same settings is a no-op.
pub fn ensure_default_admin(store: &SharedStore, hasher: &CredentialHasher, admin: &BootstrapAdmin) -> Result<bool> {
    let username = normalize_username(&admin.username).map_err(|e| anyhow!("bootstrap admin: {e}"))?;
    check_password_policy(&admin.password).map_err(|e| anyhow!("bootstrap admin: {e}"))?;
    let email = match admin.email.as_deref() {
        Some(raw) => normalize_email(raw).map_err(|e| anyhow!("bootstrap admin: {e}"))?,
        None => None,
    };
    if !store.connect().is_empty() { return Ok(false); }

    // Hash before taking the connection again.
    let password_hash = hasher.hash(&admin.password)?;
    let mut conn = store.connect();
    if !conn.is_empty() { return Ok(false); }
    conn.insert(NewUser {
        username: username.clone(),
        full_name: admin.full_name.as_deref().map(escape_markup),
        email,
        password_hash,
        role: Role::Admin.as_str().to_string(),
        disabled: false,
    })?;
    drop(conn);
    tracing::info!(username = %username, "seeded bootstrap admin account");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cheap parameters; production cost is irrelevant to correctness.
    fn fast() -> CredentialHasher {
        CredentialHasher::new(&HashingConfig { memory_kib: 64, iterations: 1, lanes: 1 }).unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let h = fast();
        let phc = h.hash("Correct1horse").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert_ne!(phc, "Correct1horse");
        assert!(h.verify("Correct1horse", &phc));
        assert!(!h.verify("correct1horse", &phc));
        assert!(!h.needs_rehash(&phc));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let h = fast();
        assert_ne!(h.hash("Passw0rdX").unwrap(), h.hash("Passw0rdX").unwrap());
    }

    #[test]
    fn hashes_from_other_params_still_verify() {
        let phc = fast().hash("Passw0rdX").unwrap();
        let stronger = CredentialHasher::new(&HashingConfig { memory_kib: 128, iterations: 2, lanes: 1 }).unwrap();
        assert!(stronger.verify("Passw0rdX", &phc));
    }

    #[test]
    fn legacy_bcrypt_hashes_verify_and_need_rehash() {
        let h = fast();
        let legacy = bcrypt::hash("Braseg26x", 4).unwrap();
        assert!(h.verify("Braseg26x", &legacy));
        assert!(!h.verify("braseg26x", &legacy));
        assert!(h.needs_rehash(&legacy));
    }

    #[test]
    fn malformed_hash_is_false_not_error() {
        let h = fast();
        for stored in ["", "plaintext", "$argon2id$garbage", "$2b$12$short"] {
            assert!(!h.verify("anything", stored), "{stored}");
        }
    }

    fn bootstrap(username: &str, password: &str) -> BootstrapAdmin {
        BootstrapAdmin { username: username.into(), password: password.into(), full_name: Some("Root <Admin>".into()), email: None }
    }

    #[test]
    fn bootstrap_admin_seeds_empty_table_once() {
        let store = SharedStore::in_memory();
        let h = fast();
        assert!(ensure_default_admin(&store, &h, &bootstrap("root", "Adm1nistrator")).unwrap());
        assert!(!ensure_default_admin(&store, &h, &bootstrap("other", "Adm1nistrator")).unwrap());

        let conn = store.connect();
        assert_eq!(conn.len(), 1);
        let root = conn.find_by_username("root").unwrap();
        assert_eq!(root.role, "admin");
        assert_eq!(root.full_name.as_deref(), Some("Root &lt;Admin&gt;"));
        assert!(h.verify("Adm1nistrator", &root.password_hash));
    }

    #[test]
    fn bootstrap_admin_password_must_meet_policy() {
        let store = SharedStore::in_memory();
        assert!(ensure_default_admin(&store, &fast(), &bootstrap("root", "weak")).is_err());
        assert!(store.connect().is_empty());
    }

    #[test]
    fn password_policy() {
        assert!(check_password_policy("Abcdefg1").is_ok());
        assert!(check_password_policy("Abc1").is_err());
        assert!(check_password_policy("Abcdef 12").is_err());
        assert!(check_password_policy("Abcdefgh").is_err());
        assert!(check_password_policy("abcdefg1").is_err());
    }
}
