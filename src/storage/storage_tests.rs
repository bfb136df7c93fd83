use super::*;

fn new_user(username: &str, email: Option<&str>) -> NewUser {
    NewUser {
        username: username.to_string(),
        full_name: Some(format!("{username} full")),
        email: email.map(|e| e.to_string()),
        password_hash: "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaA".to_string(),
        role: "solicitante".to_string(),
        disabled: false,
    }
}

#[test]
fn insert_assigns_increasing_ids_and_persists() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let mut store = Store::open(tmp.path()).unwrap();
        let a = store.insert(new_user("alice", Some("alice@example.com"))).unwrap();
        let b = store.insert(new_user("bob", None)).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }
    let reopened = Store::open(tmp.path()).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.find_by_username("bob").unwrap().id, 2);
    assert!(tmp.path().join(USERS_FILE).exists());
    assert!(!tmp.path().join("users.json.tmp").exists());
}

#[test]
fn duplicate_username_rejected_without_new_row() {
    let mut store = Store::in_memory();
    store.insert(new_user("alice", None)).unwrap();
    let err = store.insert(new_user("alice", None)).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateUsername));
    assert_eq!(store.len(), 1);
}

#[test]
fn duplicate_email_rejected_case_insensitively() {
    let mut store = Store::in_memory();
    store.insert(new_user("alice", Some("a@example.com"))).unwrap();
    let err = store.insert(new_user("bob", Some("A@Example.com"))).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEmail));

    let bob = store.insert(new_user("bob", Some("b@example.com"))).unwrap();
    let patch = UserPatch { email: Some("a@example.com".into()), ..Default::default() };
    assert!(matches!(store.update(bob.id, patch), Err(StoreError::DuplicateEmail)));
    // Re-saving your own email is not a collision.
    let patch = UserPatch { email: Some("b@example.com".into()), ..Default::default() };
    assert!(store.update(bob.id, patch).is_ok());
}

#[test]
fn update_touches_only_present_fields() {
    let mut store = Store::in_memory();
    let rec = store.insert(new_user("carol", None)).unwrap();
    let patch = UserPatch { role: Some("supervisor".into()), ..Default::default() };
    let updated = store.update(rec.id, patch).unwrap();
    assert_eq!(updated.role, "supervisor");
    assert_eq!(updated.full_name, rec.full_name);
    assert_eq!(updated.password_hash, rec.password_hash);
    assert!(matches!(store.update(99, UserPatch::default()), Err(StoreError::NotFound(99))));
}

#[test]
fn deleted_ids_are_not_reused() {
    let mut store = Store::in_memory();
    let a = store.insert(new_user("a", None)).unwrap();
    store.delete(a.id).unwrap();
    let b = store.insert(new_user("b", None)).unwrap();
    assert_ne!(a.id, b.id);
    assert!(store.find_by_id(a.id).is_none());
    assert!(matches!(store.delete(a.id), Err(StoreError::NotFound(_))));
}

#[test]
fn corrupt_table_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join(USERS_FILE), "{ not json").unwrap();
    assert!(matches!(Store::open(tmp.path()), Err(StoreError::Corrupt(_))));
}

#[test]
fn list_is_ordered_by_id() {
    let shared = SharedStore::in_memory();
    {
        let mut conn = shared.connect();
        for name in ["z", "y", "x"] { conn.insert(new_user(name, None)).unwrap(); }
    }
    let names: Vec<String> = shared.connect().list().into_iter().map(|u| u.username).collect();
    assert_eq!(names, vec!["z", "y", "x"]);
}
