//! Uninstall semantics: full, upgrade and residual-storage removal.

mod common;

use common::{TYPE, TestEngine};
use stowage_core::OperationStatus;
use stowage_engine::EngineError;

#[tokio::test]
async fn full_uninstall_of_last_version_removes_everything() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;

    let outcome = engine.uninstall_and_wait("com.example.app", "1.0.0", "full").await;
    assert_eq!(outcome.status, OperationStatus::Success);

    assert_eq!(engine.installed_count().await, 0);
    let listed = engine.executor.app_details_list(&Default::default()).await.unwrap();
    assert!(listed.is_empty(), "app row should be gone: {listed:?}");
    assert!(!engine.app_dir("com.example.app", "1.0.0").exists());
    assert!(!engine.data_dir("com.example.app").exists());
}

#[tokio::test]
async fn full_uninstall_keeps_data_while_other_versions_remain() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;
    engine.install_and_wait("com.example.app", "2.0.0").await;

    let outcome = engine.uninstall_and_wait("com.example.app", "1.0.0", "full").await;
    assert_eq!(outcome.status, OperationStatus::Success);

    // Version 2 still present, shared data directory still present.
    assert_eq!(engine.installed_count().await, 1);
    assert!(!engine.app_dir("com.example.app", "1.0.0").exists());
    assert!(engine.app_dir("com.example.app", "2.0.0").is_dir());
    assert!(engine.data_dir("com.example.app").is_dir());

    let outcome = engine.uninstall_and_wait("com.example.app", "2.0.0", "full").await;
    assert_eq!(outcome.status, OperationStatus::Success);
    assert!(!engine.data_dir("com.example.app").exists());
    assert!(engine.executor.app_details_list(&Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn upgrade_uninstall_preserves_persistent_data() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;

    // A file the app wrote into its persistent area.
    let marker = engine.data_dir("com.example.app").join("settings.json");
    std::fs::write(&marker, b"{\"volume\":11}").unwrap();

    let outcome = engine.uninstall_and_wait("com.example.app", "1.0.0", "upgrade").await;
    assert_eq!(outcome.status, OperationStatus::Success);

    // Installed row and bundle gone; app row and data intact.
    assert_eq!(engine.installed_count().await, 0);
    assert!(!engine.app_dir("com.example.app", "1.0.0").exists());
    assert_eq!(std::fs::read(&marker).unwrap(), b"{\"volume\":11}");

    let listed = engine.executor.app_details_list(&Default::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].version.is_none());

    // The next version finds the data in place.
    engine.install_and_wait("com.example.app", "2.0.0").await;
    assert_eq!(std::fs::read(&marker).unwrap(), b"{\"volume\":11}");
}

#[tokio::test]
async fn residual_storage_is_removed_by_versionless_full_uninstall() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;
    std::fs::write(engine.data_dir("com.example.app").join("f"), b"x").unwrap();
    engine.uninstall_and_wait("com.example.app", "1.0.0", "upgrade").await;

    // Data-only record left behind; empty version plus "full" clears it.
    let outcome = engine.uninstall_and_wait("com.example.app", "", "full").await;
    assert_eq!(outcome.status, OperationStatus::Success);

    assert!(engine.executor.app_details_list(&Default::default()).await.unwrap().is_empty());
    assert!(!engine.data_dir("com.example.app").exists());
}

#[tokio::test]
async fn versionless_upgrade_uninstall_is_rejected() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;
    engine.uninstall_and_wait("com.example.app", "1.0.0", "upgrade").await;

    let err = engine
        .executor
        .uninstall(TYPE, "com.example.app", "", "upgrade")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WrongParams(_)));
}

#[tokio::test]
async fn uninstalling_an_unknown_app_is_rejected() {
    let engine = TestEngine::new().await;

    let err = engine
        .executor
        .uninstall(TYPE, "com.missing.app", "1.0.0", "full")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WrongParams(_)));
}

#[tokio::test]
async fn unknown_uninstall_type_is_rejected() {
    let engine = TestEngine::new().await;
    engine.install_and_wait("com.example.app", "1.0.0").await;

    let err = engine
        .executor
        .uninstall(TYPE, "com.example.app", "1.0.0", "purge")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WrongParams(_)));
}
