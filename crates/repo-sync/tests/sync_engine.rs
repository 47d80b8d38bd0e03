//! Sync engine behavior against the in-memory remote.

use std::sync::Arc;
use std::time::Duration;

use common::{FileOperation, OutcomeStatus, RetryPolicy};
use repo_sync::{git_blob_sha, InMemoryRemote, SyncEngine};

const REPO: &str = "web";
const BRANCH: &str = "main";

fn remote() -> Arc<InMemoryRemote> {
    Arc::new(
        InMemoryRemote::new("acme")
            .with_repository(REPO, BRANCH)
            .with_file(REPO, BRANCH, "README.md", "# Web\n")
            .with_file(REPO, BRANCH, "src/app.ts", "export const a = 1;\n"),
    )
}

fn engine(remote: &Arc<InMemoryRemote>) -> SyncEngine {
    SyncEngine::new(remote.clone(), RetryPolicy::none())
}

#[tokio::test]
async fn delete_of_missing_file_is_a_no_op() {
    let remote = remote();
    let ops = vec![FileOperation::delete("x.txt").unwrap()];

    let report = engine(&remote).apply(REPO, BRANCH, &ops, "Cleanup").await;

    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(report.no_op_count(), 1);
    assert_eq!(report.failed_count(), 0);
    assert!(remote.commits().is_empty());
}

#[tokio::test]
async fn deleting_twice_never_fails() {
    let remote = remote();
    let engine = engine(&remote);
    let ops = vec![FileOperation::delete("src/app.ts").unwrap()];

    let first = engine.apply(REPO, BRANCH, &ops, "Remove app").await;
    let second = engine.apply(REPO, BRANCH, &ops, "Remove app").await;

    assert!(first.is_clean());
    assert_eq!(first.no_op_count(), 0);
    assert!(second.is_clean());
    assert_eq!(second.no_op_count(), 1);
    assert_eq!(remote.file(REPO, BRANCH, "src/app.ts"), None);
    assert_eq!(remote.commits().len(), 1);
}

#[tokio::test]
async fn one_conflicting_operation_does_not_stop_the_rest() {
    let remote = remote();
    remote.inject_conflict("src/app.ts");
    let ops = vec![
        FileOperation::create("index.html", "<html></html>").unwrap(),
        FileOperation::update("src/app.ts", "export const a = 2;\n").unwrap(),
        FileOperation::create("src/util.ts", "export {}\n").unwrap(),
        FileOperation::delete("README.md").unwrap(),
    ];

    let report = engine(&remote).apply(REPO, BRANCH, &ops, "Batch").await;

    assert_eq!(report.succeeded_count(), 3);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.total(), ops.len());
    assert_eq!(report.failed_paths(), vec!["src/app.ts"]);
    assert!(matches!(
        &report.failed[0].status,
        OutcomeStatus::Failed { error } if error.contains("modified concurrently")
    ));
    assert_eq!(
        remote.file(REPO, BRANCH, "src/app.ts").as_deref(),
        Some("export const a = 1;\n")
    );
    assert_eq!(
        remote.file(REPO, BRANCH, "src/util.ts").as_deref(),
        Some("export {}\n")
    );
}

#[tokio::test]
async fn operations_are_applied_in_order_with_card_commit_messages() {
    let remote = remote();
    let ops = vec![
        FileOperation::create("b.txt", "b").unwrap(),
        FileOperation::create("a.txt", "a").unwrap(),
    ];

    engine(&remote).apply(REPO, BRANCH, &ops, "Letters").await;

    let messages: Vec<_> = remote.commits().into_iter().map(|c| c.message).collect();
    assert_eq!(
        messages,
        vec!["relay: create b.txt (Letters)", "relay: create a.txt (Letters)"]
    );
}

#[tokio::test]
async fn unchanged_content_is_not_committed() {
    let remote = remote();
    let ops = vec![FileOperation::update("README.md", "# Web\n").unwrap()];

    let report = engine(&remote).apply(REPO, BRANCH, &ops, "Same").await;

    assert_eq!(report.no_op_count(), 1);
    assert!(remote.commits().is_empty());
}

#[tokio::test]
async fn create_of_existing_path_replaces_it() {
    let remote = remote();
    let ops = vec![FileOperation::create("README.md", "# New\n").unwrap()];

    let report = engine(&remote).apply(REPO, BRANCH, &ops, "Readme").await;

    assert!(report.is_clean());
    assert_eq!(
        report.succeeded[0].status,
        OutcomeStatus::Applied {
            content_hash: Some(git_blob_sha(b"# New\n"))
        }
    );
    assert_eq!(remote.file(REPO, BRANCH, "README.md").as_deref(), Some("# New\n"));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried() {
    let remote = remote();
    remote.fail_transiently(2);
    let engine = SyncEngine::new(remote.clone(), RetryPolicy::default());
    let ops = vec![FileOperation::create("new.txt", "hello").unwrap()];

    let report = engine.apply(REPO, BRANCH, &ops, "Retry").await;

    assert!(report.is_clean());
    assert_eq!(remote.file(REPO, BRANCH, "new.txt").as_deref(), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_only_that_operation() {
    let remote = remote();
    let engine = SyncEngine::new(
        remote.clone(),
        RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(200),
        },
    );
    remote.fail_transiently(2);
    let ops = vec![
        FileOperation::create("first.txt", "1").unwrap(),
        FileOperation::create("second.txt", "2").unwrap(),
    ];

    let report = engine.apply(REPO, BRANCH, &ops, "Flaky").await;

    assert_eq!(report.failed_paths(), vec!["first.txt"]);
    assert_eq!(report.succeeded_count(), 1);
    assert_eq!(remote.file(REPO, BRANCH, "second.txt").as_deref(), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn write_that_landed_before_a_lost_response_is_not_a_conflict() {
    let remote = remote();
    remote.lose_write_response("README.md");
    remote.lose_write_response("new.txt");
    let engine = SyncEngine::new(remote.clone(), RetryPolicy::default());
    let ops = vec![
        FileOperation::update("README.md", "# Updated\n").unwrap(),
        FileOperation::create("new.txt", "fresh").unwrap(),
    ];

    let report = engine.apply(REPO, BRANCH, &ops, "Lost").await;

    assert!(report.is_clean(), "{:?}", report.failed_paths());
    assert_eq!(
        report.succeeded[0].status,
        OutcomeStatus::Applied {
            content_hash: Some(git_blob_sha(b"# Updated\n"))
        }
    );
    assert_eq!(remote.file(REPO, BRANCH, "README.md").as_deref(), Some("# Updated\n"));
    assert_eq!(remote.file(REPO, BRANCH, "new.txt").as_deref(), Some("fresh"));
    assert_eq!(remote.commits().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn lost_response_without_retries_left_is_a_failure() {
    let remote = remote();
    remote.lose_write_response("new.txt");
    let ops = vec![FileOperation::create("new.txt", "fresh").unwrap()];

    let report = engine(&remote).apply(REPO, BRANCH, &ops, "Lost").await;

    assert_eq!(report.failed_paths(), vec!["new.txt"]);
}
