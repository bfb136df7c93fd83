use super::principal::Principal;
use crate::storage::SharedStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("subject no longer exists")]
    Unknown,
    #[error("account disabled")]
    Disabled,
}

/// Load the live user behind a token subject.
///
/// Always goes to the store; nothing about the user is cached between requests, so role
/// changes, password resets, suspensions and deletions apply from the next request on.
/// The store connection is released before returning.
pub fn resolve(store: &SharedStore, subject: &str) -> Result<Principal, ResolveError> {
    let record = store.connect().find_by_username(subject).ok_or(ResolveError::Unknown)?;
    if record.disabled {
        return Err(ResolveError::Disabled);
    }
    Ok(Principal::from_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewUser, UserPatch};

    fn seed(store: &SharedStore, username: &str, role: &str) -> u64 {
        store.connect().insert(NewUser {
            username: username.into(),
            full_name: None,
            email: None,
            password_hash: "x".into(),
            role: role.into(),
            disabled: false,
        }).unwrap().id
    }

    #[test]
    fn resolves_current_role() {
        let store = SharedStore::in_memory();
        let id = seed(&store, "ana", "solicitante");
        assert!(!resolve(&store, "ana").unwrap().is_admin());
        store.connect().update(id, UserPatch { role: Some("admin".into()), ..Default::default() }).unwrap();
        assert!(resolve(&store, "ana").unwrap().is_admin());
    }

    #[test]
    fn missing_and_disabled_users_fail() {
        let store = SharedStore::in_memory();
        assert_eq!(resolve(&store, "ghost").unwrap_err(), ResolveError::Unknown);
        let id = seed(&store, "bia", "supervisor");
        store.connect().update(id, UserPatch { disabled: Some(true), ..Default::default() }).unwrap();
        assert_eq!(resolve(&store, "bia").unwrap_err(), ResolveError::Disabled);
        store.connect().delete(id).unwrap();
        assert_eq!(resolve(&store, "bia").unwrap_err(), ResolveError::Unknown);
    }
}
