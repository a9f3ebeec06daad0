//! Scenario: Store password resolution
//!
//! # Invariants under test
//!
//! 1. The env var named by `store.password_env` wins when set.
//! 2. Otherwise an explicitly configured pgpass file is consulted.
//! 3. An explicitly configured pgpass file that does not exist is an error
//!    naming the path.
//! 4. No match anywhere resolves to no password.
//! 5. Config files on disk load and layer the same way as strings.

use std::fs;

use smw_config::{
    load_layered_yaml, resolve_store_password, ConfigError, PasswordSource, StoreSection,
};

fn store_with_pgpass(path: &std::path::Path) -> StoreSection {
    StoreSection {
        pgpass: Some(path.to_path_buf()),
        ..StoreSection::default()
    }
}

#[test]
fn named_env_var_wins_over_pgpass() {
    let dir = tempfile::tempdir().unwrap();
    let pgpass = dir.path().join("pgpass");
    fs::write(&pgpass, "*:*:*:*:from-file\n").unwrap();

    let var = "SMW_TEST_PW_ENV_WINS";
    std::env::set_var(var, "from-env");
    let store = StoreSection {
        password_env: Some(var.to_string()),
        ..store_with_pgpass(&pgpass)
    };

    let resolved = resolve_store_password(&store).unwrap();
    std::env::remove_var(var);

    assert_eq!(resolved.password.as_deref(), Some("from-env"));
    assert_eq!(resolved.source, PasswordSource::Env(var.to_string()));
}

#[test]
fn unset_env_var_falls_back_to_pgpass() {
    let dir = tempfile::tempdir().unwrap();
    let pgpass = dir.path().join("pgpass");
    fs::write(
        &pgpass,
        "localhost:5433:metacat:dataone_readonly:from-file\n",
    )
    .unwrap();

    let store = StoreSection {
        password_env: Some("SMW_TEST_PW_DEFINITELY_UNSET".to_string()),
        ..store_with_pgpass(&pgpass)
    };

    let resolved = resolve_store_password(&store).unwrap();
    assert_eq!(resolved.password.as_deref(), Some("from-file"));
    assert_eq!(resolved.source, PasswordSource::Pgpass(pgpass));
}

#[test]
fn missing_explicit_pgpass_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let err = resolve_store_password(&store_with_pgpass(&missing)).unwrap_err();
    match err {
        ConfigError::Pgpass { path, .. } => assert!(path.ends_with("nope")),
        other => panic!("expected Pgpass error, got {other:?}"),
    }
}

#[test]
fn no_matching_line_resolves_to_none() {
    let dir = tempfile::tempdir().unwrap();
    let pgpass = dir.path().join("pgpass");
    fs::write(&pgpass, "otherhost:1:otherdb:someone:x\n").unwrap();

    let resolved = resolve_store_password(&store_with_pgpass(&pgpass)).unwrap();
    assert!(resolved.password.is_none());
    assert_eq!(resolved.source, PasswordSource::None);
}

#[test]
fn layered_files_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let local = dir.path().join("local.yaml");
    fs::write(&base, "store:\n  host: db.internal\nindex:\n  batch_size: 5\n").unwrap();
    fs::write(&local, "index:\n  batch_size: 7\n").unwrap();

    let loaded = load_layered_yaml(&[&base, &local]).unwrap();
    let cfg = loaded.watch_config().unwrap();
    assert_eq!(cfg.store.host, "db.internal");
    assert_eq!(cfg.index.batch_size, 7);

    let err = load_layered_yaml(&[dir.path().join("absent.yaml")]).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}
