// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn db_backend_accepts_sqlite_and_empty() {
    std::env::remove_var("PAL_DB_TYPE");
    assert!(check_db_backend().is_ok());

    std::env::set_var("PAL_DB_TYPE", "sqlite");
    assert!(check_db_backend().is_ok());

    std::env::set_var("PAL_DB_TYPE", "");
    assert!(check_db_backend().is_ok());
    std::env::remove_var("PAL_DB_TYPE");
}

#[test]
#[serial]
fn db_backend_rejects_unknown() {
    std::env::set_var("PAL_DB_TYPE", "postgres");
    let err = check_db_backend().unwrap_err();
    assert_eq!(err.kind(), "invalid_state");
    std::env::remove_var("PAL_DB_TYPE");
}

#[test]
fn db_path_precedence() {
    let root = Path::new("/proj");
    let config = PalConfig::default();

    // Explicit override wins.
    let path = resolve_db_path(Some("/custom.db".into()), &config, root).unwrap();
    assert_eq!(path, PathBuf::from("/custom.db"));

    // Config-relative paths resolve against the project root.
    let config = PalConfig {
        db_path: Some(".pal/local.db".into()),
        ..PalConfig::default()
    };
    let path = resolve_db_path(None, &config, root).unwrap();
    assert_eq!(path, PathBuf::from("/proj/.pal/local.db"));

    // Absolute config paths pass through.
    let config = PalConfig {
        db_path: Some("/var/pal.db".into()),
        ..PalConfig::default()
    };
    let path = resolve_db_path(None, &config, root).unwrap();
    assert_eq!(path, PathBuf::from("/var/pal.db"));
}

#[test]
#[serial]
fn init_opens_store_under_project_config() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("CLAUDE_PROJECT_DIR", dir.path());
    std::env::remove_var("PAL_DB_TYPE");

    let ctx = Context::init(
        Some(dir.path().join("pal.db")),
        crate::output::OutputFormat::Json,
    )
    .unwrap();
    assert_eq!(ctx.project_root, dir.path());
    assert!(dir.path().join("pal.db").exists());

    std::env::remove_var("CLAUDE_PROJECT_DIR");
}
