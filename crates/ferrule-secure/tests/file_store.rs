//! Integration tests for the file-backed store.

use std::fs;
use std::time::Duration;

use ferrule::{FutureStatus, Scheduler};
use ferrule_secure::{
    FileStore, SecureErrorCode, SecureStore, StoreError, UserSecureManager, ROOT_DIR_ENV,
};

/// Data survives a new store instance over the same directory.
#[test]
fn test_data_persists_across_instances() {
    let root = tempfile::tempdir().unwrap();
    FileStore::new(root.path(), "auth")
        .save("app1", b"secret")
        .unwrap();

    let reopened = FileStore::new(root.path(), "auth");
    assert_eq!(reopened.load("app1").unwrap(), b"secret");
    assert!(matches!(
        FileStore::new(root.path(), "other").load("app1"),
        Err(StoreError::NotFound(_))
    ));
}

/// Keys with path syntax stay inside the domain directory.
#[test]
fn test_hostile_keys_stay_in_domain_dir() {
    let root = tempfile::tempdir().unwrap();
    let store = FileStore::new(root.path(), "auth");

    for key in ["../escape", "a/b", ".hidden", "spaces and ünïcode"] {
        store.save(key, key.as_bytes()).unwrap();
        assert_eq!(store.load(key).unwrap(), key.as_bytes());
    }

    let names: Vec<_> = fs::read_dir(store.dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(names.len(), 4);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 1);
}

/// Overwrites replace contents; deletes are idempotent.
#[test]
fn test_overwrite_and_delete() {
    let root = tempfile::tempdir().unwrap();
    let store = FileStore::new(root.path(), "auth");

    store.save("app1", b"one").unwrap();
    store.save("app1", b"two").unwrap();
    assert_eq!(store.load("app1").unwrap(), b"two");

    store.delete("app1").unwrap();
    store.delete("app1").unwrap();
    assert!(matches!(store.load("app1"), Err(StoreError::NotFound(_))));

    store.save("app2", b"x").unwrap();
    store.delete_all().unwrap();
    store.delete_all().unwrap();
    assert!(!store.dir().exists());
}

/// The root directory can come from the environment.
#[test]
fn test_from_env_uses_root_variable() {
    let root = tempfile::tempdir().unwrap();
    std::env::set_var(ROOT_DIR_ENV, root.path());
    let store = FileStore::from_env("auth");
    std::env::remove_var(ROOT_DIR_ENV);

    assert_eq!(store.dir(), root.path().join("auth"));
}

/// The manager reports backend errors from a file store by code.
#[test]
fn test_manager_over_file_store() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let root = tempfile::tempdir().unwrap();
    let manager =
        UserSecureManager::with_scheduler(FileStore::new(root.path(), "auth"), Scheduler::new());

    manager.save_user_data("app1", "secret");
    let loaded = manager.load_user_data("app1");
    let missing = manager.load_user_data("app2");

    assert_eq!(missing.wait(Duration::from_secs(5)), FutureStatus::Complete);
    assert_eq!(loaded.result().unwrap(), "secret");
    let (code, _) = missing.error().unwrap();
    assert_eq!(SecureErrorCode::from_i32(code), Some(SecureErrorCode::NoEntry));

    fs::write(FileStore::new(root.path(), "auth").dir().join("bad"), [0xff, 0xfe]).unwrap();
    let invalid = manager.load_user_data("bad");
    assert_eq!(invalid.wait(Duration::from_secs(5)), FutureStatus::Complete);
    let (code, _) = invalid.error().unwrap();
    assert_eq!(SecureErrorCode::from_i32(code), Some(SecureErrorCode::InvalidData));
}
