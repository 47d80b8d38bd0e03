//! GitHub client against a stubbed REST API.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::{FileOperation, RetryPolicy};
use repo_sync::{GitHubClient, PutFile, RepositoryRemote, SyncEngine, SyncError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(&server.uri(), "acme", "gh-token", Duration::from_secs(5)).unwrap()
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn get_file_decodes_content_and_hash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/contents/src/app.ts"))
        .and(query_param("ref", "main"))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "encoding": "base64",
            "sha": "abc123",
            "content": format!("{}\n", BASE64.encode("export {}\n")),
        })))
        .mount(&server)
        .await;

    let file = client(&server)
        .get_file("web", "src/app.ts", "main")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(file.content_hash, "abc123");
    assert_eq!(file.text.as_deref(), Some("export {}\n"));
}

#[tokio::test]
async fn missing_repository_and_file_are_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let client = client(&server);
    assert!(client.repository("nope").await.unwrap().is_none());
    assert!(client.get_file("nope", "a.txt", "main").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_repository_tree_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/fresh/git/trees/main"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Git Repository is empty." })),
        )
        .mount(&server)
        .await;

    assert!(client(&server)
        .list_tree("fresh", "main")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn tree_lists_blobs_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/git/trees/main"))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": "t1",
            "truncated": false,
            "tree": [
                { "path": "src", "type": "tree", "sha": "s1" },
                { "path": "src/app.ts", "type": "blob", "sha": "s2" },
                { "path": "README.md", "type": "blob", "sha": "s3" }
            ]
        })))
        .mount(&server)
        .await;

    let paths = client(&server).list_tree("web", "main").await.unwrap();
    assert_eq!(paths, vec!["src/app.ts", "README.md"]);
}

#[tokio::test]
async fn create_repository_posts_to_the_organization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orgs/acme/repos"))
        .and(body_partial_json(json!({
            "name": "space-game",
            "private": false,
            "auto_init": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "name": "space-game",
            "default_branch": "main",
            "html_url": "https://github.com/acme/space-game"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let info = client(&server)
        .create_repository("space-game", "Board: Space Game")
        .await
        .unwrap();
    assert_eq!(info.html_url, "https://github.com/acme/space-game");
    assert_eq!(info.branch(), "main");
}

#[tokio::test]
async fn put_sends_base64_content_and_expected_hash() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/contents/README.md"))
        .and(body_partial_json(json!({
            "message": "relay: update README.md (Docs)",
            "content": BASE64.encode("# Hi"),
            "branch": "main",
            "sha": "old-sha"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": { "sha": "new-sha", "path": "README.md" },
            "commit": { "sha": "c1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let hash = client(&server)
        .put_file(
            "web",
            "README.md",
            "main",
            PutFile {
                content: "# Hi",
                expected_hash: Some("old-sha"),
                message: "relay: update README.md (Docs)",
            },
        )
        .await
        .unwrap();
    assert_eq!(hash, "new-sha");
}

#[tokio::test]
async fn hash_mismatch_on_put_is_a_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "message": "README.md does not match old-sha"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .put_file(
            "web",
            "README.md",
            "main",
            PutFile {
                content: "# Hi",
                expected_hash: Some("old-sha"),
                message: "m",
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn rate_limit_is_reported_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("retry-after", "7")
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .mount(&server)
        .await;

    let err = client(&server).repository("web").await.unwrap_err();
    match err {
        SyncError::RateLimited { retry_after } => assert_eq!(retry_after, Duration::from_secs(7)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn engine_retries_rate_limited_reads() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/contents/notes.txt"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "1")
                .set_body_string("slow down"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/contents/notes.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/contents/notes.txt"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "content": { "sha": "n1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = SyncEngine::new(Arc::new(client(&server)), fast_retry());
    let ops = vec![FileOperation::create("notes.txt", "remember").unwrap()];

    let report = engine.apply("web", "main", &ops, "Notes").await;
    assert!(report.is_clean());
}

#[tokio::test]
async fn engine_records_conflict_and_continues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/contents/a.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "encoding": "base64",
            "sha": "a-old",
            "content": BASE64.encode("old"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/contents/a.txt"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "a.txt does not match a-old" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/web/contents/b.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/repos/acme/web/contents/b.txt"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "content": { "sha": "b1" }
        })))
        .mount(&server)
        .await;

    let engine = SyncEngine::new(Arc::new(client(&server)), fast_retry());
    let ops = vec![
        FileOperation::update("a.txt", "new").unwrap(),
        FileOperation::create("b.txt", "b").unwrap(),
    ];

    let report = engine.apply("web", "main", &ops, "Pair").await;
    assert_eq!(report.failed_paths(), vec!["a.txt"]);
    assert_eq!(report.succeeded_count(), 1);
}
