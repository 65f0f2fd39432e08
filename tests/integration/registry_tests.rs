//! Integration tests for the browser connection registry: the containment
//! hierarchy, durable metadata, restart restoration, and session cleanup.

use browser_warden::models::storage::{Cookie, StorageState};
use browser_warden::AppError;

use super::test_helpers::test_stack;

fn seed_with_cookie(name: &str) -> StorageState {
    StorageState {
        cookies: vec![Cookie {
            name: name.into(),
            value: "v".into(),
            domain: "example.com".into(),
            path: "/".into(),
            expires: -1.0,
            http_only: false,
            secure: false,
            same_site: None,
        }],
        origins: Vec::new(),
    }
}

#[tokio::test]
async fn create_context_requires_connection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    let err = stack
        .registry
        .create_context("never-connected", None)
        .await
        .expect_err("must require a live connection");
    assert!(matches!(err, AppError::NotConnected(_)), "got {err}");
}

#[tokio::test]
async fn context_and_page_hierarchy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");

    let context_id = stack
        .registry
        .create_context("s1", None)
        .await
        .expect("context");
    assert_eq!(stack.registry.list_contexts("s1").await, vec![context_id.clone()]);
    assert_eq!(
        stack.registry.derive_session_for_context(&context_id).await,
        Some("s1".to_owned())
    );

    let page_id = stack.registry.create_page(&context_id).await.expect("page");
    assert_eq!(
        stack.registry.session_for_page(&page_id).await,
        Some("s1".to_owned()),
        "page→session lookup is recorded at creation"
    );
}

#[tokio::test]
async fn create_page_on_unknown_context_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;
    let err = stack
        .registry
        .create_page("missing")
        .await
        .expect_err("unknown context");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn context_list_is_persisted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let context_id = stack
        .registry
        .create_context("s1", None)
        .await
        .expect("context");

    let persisted = stack.store.read_context_ids("s1").await;
    assert_eq!(persisted, vec![context_id]);
}

#[tokio::test]
async fn seeded_context_reads_back_its_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");

    let seed = seed_with_cookie("sid");
    let context_id = stack
        .registry
        .create_context("s1", Some(seed.clone()))
        .await
        .expect("context");

    let snapshot = stack
        .registry
        .storage_state(&context_id)
        .await
        .expect("state");
    assert_eq!(snapshot, seed, "seed round-trips without loss");
}

#[tokio::test]
async fn close_context_removes_list_entry_and_state_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let context_id = stack
        .registry
        .create_context("s1", Some(seed_with_cookie("sid")))
        .await
        .expect("context");
    let page_id = stack.registry.create_page(&context_id).await.expect("page");

    stack
        .registry
        .close_context(&context_id)
        .await
        .expect("close");

    assert!(stack.registry.list_contexts("s1").await.is_empty());
    assert!(
        !stack
            .store
            .context_state_file("s1", &context_id)
            .exists(),
        "storage-state file must be deleted"
    );
    assert!(stack.store.read_context_ids("s1").await.is_empty());

    // Pages owned by the context went with it.
    assert!(stack.registry.session_for_page(&page_id).await.is_none());
    assert!(matches!(
        stack.registry.page(&page_id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn close_page_removes_both_mappings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let context_id = stack
        .registry
        .create_context("s1", None)
        .await
        .expect("context");
    let page_id = stack.registry.create_page(&context_id).await.expect("page");

    stack.registry.close_page(&page_id).await.expect("close");
    assert!(stack.registry.session_for_page(&page_id).await.is_none());
    assert!(matches!(
        stack.registry.page(&page_id).await,
        Err(AppError::NotFound(_))
    ));

    let err = stack
        .registry
        .close_page(&page_id)
        .await
        .expect_err("second close");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn cleanup_session_drains_every_table() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let c1 = stack.registry.create_context("s1", None).await.expect("c1");
    let c2 = stack.registry.create_context("s1", None).await.expect("c2");
    let p1 = stack.registry.create_page(&c1).await.expect("p1");
    let p2 = stack.registry.create_page(&c2).await.expect("p2");

    let warnings = stack.registry.cleanup_session("s1").await;
    assert!(warnings.is_empty(), "got {warnings:?}");

    assert!(!stack.registry.is_connected("s1").await);
    assert!(stack.registry.list_contexts("s1").await.is_empty());
    for context_id in [&c1, &c2] {
        assert!(stack
            .registry
            .derive_session_for_context(context_id)
            .await
            .is_none());
        assert!(matches!(
            stack.registry.storage_state(context_id).await,
            Err(AppError::NotFound(_))
        ));
    }
    for page_id in [&p1, &p2] {
        assert!(stack.registry.session_for_page(page_id).await.is_none());
        assert!(matches!(
            stack.registry.page(page_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    // Cleanup flushed each context's storage state before closing.
    assert!(stack.store.context_state_file("s1", &c1).exists());
    assert!(stack.store.context_state_file("s1", &c2).exists());
}

#[tokio::test]
async fn cleanup_session_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let warnings = stack.registry.cleanup_session("s1").await;
    assert!(warnings.is_empty());
    let warnings = stack.registry.cleanup_session("s1").await;
    assert!(warnings.is_empty(), "second cleanup finds nothing");
}

#[tokio::test]
async fn connect_restores_contexts_from_durable_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    // Simulate a prior process: context list and state blob on disk, no
    // in-memory state.
    let context_id = "ctx-restored".to_owned();
    stack
        .store
        .write_context_ids("s1", std::slice::from_ref(&context_id))
        .await
        .expect("write list");
    stack
        .store
        .write_context_state("s1", &context_id, &seed_with_cookie("restored"))
        .await
        .expect("write state");

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");

    assert_eq!(stack.registry.list_contexts("s1").await, vec![context_id.clone()]);
    let snapshot = stack
        .registry
        .storage_state(&context_id)
        .await
        .expect("state");
    assert_eq!(snapshot.cookies[0].name, "restored");
}

#[tokio::test]
async fn snapshot_entries_without_state_blobs_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    // The durable list can run ahead of the state blobs; treat it as
    // advisory rather than failing the connect.
    stack
        .store
        .write_context_ids("s1", &["ctx-a".into(), "ctx-b".into()])
        .await
        .expect("write list");
    stack
        .store
        .write_context_state("s1", "ctx-b", &seed_with_cookie("b"))
        .await
        .expect("write state");

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");

    assert_eq!(stack.registry.list_contexts("s1").await, vec!["ctx-b".to_owned()]);
}

#[tokio::test]
async fn disconnect_observer_cleans_up_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let stack = test_stack(dir.path()).await;

    stack
        .registry
        .connect("s1", "ws://127.0.0.1:1/session")
        .await
        .expect("connect");
    let context_id = stack
        .registry
        .create_context("s1", None)
        .await
        .expect("context");

    stack.engine.fire_disconnects();

    // The observer spawns cleanup; give it a moment to run.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert!(!stack.registry.is_connected("s1").await);
    assert!(stack.registry.list_contexts("s1").await.is_empty());
    assert!(stack
        .registry
        .derive_session_for_context(&context_id)
        .await
        .is_none());
}
