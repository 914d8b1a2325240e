mod common;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use assert_matches::assert_matches;
use common::{repo, repo_json, GitCall, RecordingGit};
use ghbackup::discovery::StaticPages;
use ghbackup::{
    Credentials, Error, GitHubClient, OwnerFilter, SyncEngine, SyncMode, SyncOutcome,
};
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine(git: &RecordingGit, root: &TempDir, mode: SyncMode, owners: &str) -> SyncEngine<RecordingGit> {
    SyncEngine::new(
        git.clone(),
        root.path(),
        mode,
        OwnerFilter::new(owners),
        Credentials::new("u", "t"),
    )
}

#[tokio::test]
async fn test_clone_twice_pulls_the_second_time() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();
    let engine = engine(&git, &root, SyncMode::Clone, "");
    let target = root.child("u").child("b");

    let first = engine.sync_repository(&repo("a", "b")).await;
    assert_eq!(first, SyncOutcome::Cloned { path: target.path().to_path_buf() });
    assert_eq!(
        git.calls(),
        vec![GitCall::Clone {
            url: "https://u:t@github.com/a/b.git".to_string(),
            path: target.path().to_path_buf(),
        }]
    );
    target.assert(predicate::path::is_dir());

    git.clear();
    let second = engine.sync_repository(&repo("a", "b")).await;
    assert_eq!(second, SyncOutcome::Pulled { path: target.path().to_path_buf() });
    assert_eq!(git.calls(), vec![GitCall::Pull { path: target.path().to_path_buf() }]);
}

#[tokio::test]
async fn test_fresh_mirror_is_init_then_one_fetch() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();
    let target = root.child("u").child("b");

    let outcome = engine(&git, &root, SyncMode::Mirror, "")
        .sync_repository(&repo("a", "b"))
        .await;

    assert_eq!(outcome, SyncOutcome::Mirrored { path: target.path().to_path_buf() });
    assert_eq!(
        git.calls(),
        vec![
            GitCall::InitBare { path: target.path().to_path_buf() },
            GitCall::FetchMirror {
                url: "https://u:t@github.com/a/b.git".to_string(),
                path: target.path().to_path_buf(),
            },
        ]
    );
    target.assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_existing_mirror_issues_no_git_commands() {
    let root = TempDir::new().unwrap();
    root.child("u").child("b").create_dir_all().unwrap();
    let git = RecordingGit::new();

    let outcome = engine(&git, &root, SyncMode::Mirror, "")
        .sync_repository(&repo("a", "b"))
        .await;

    assert_matches!(outcome, SyncOutcome::MirrorUnchanged { .. });
    assert!(git.calls().is_empty());
}

#[tokio::test]
async fn test_failure_on_one_repository_does_not_stop_the_next() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();
    git.fail_for("x");

    let mut source = StaticPages::new(vec![vec![repo("me", "x"), repo("me", "y")]]);
    let summary = engine(&git, &root, SyncMode::Clone, "")
        .run(&mut source)
        .await
        .expect("git failures are not fatal");

    let attempted: Vec<_> = git
        .calls()
        .into_iter()
        .map(|call| match call {
            GitCall::Clone { path, .. } => path.file_name().unwrap().to_string_lossy().to_string(),
            other => panic!("unexpected call {:?}", other),
        })
        .collect();
    assert_eq!(attempted, vec!["x", "y"]);

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cloned, 1);
    assert_eq!(summary.failures[0].0, "me/x");
    root.child("u").child("y").assert(predicate::path::is_dir());
    root.child("u").child("x").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_owner_filter_is_substring_match() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();

    // "alice-corp" is processed with filter "alice": containment, not exact membership
    let mut source = StaticPages::new(vec![vec![
        repo("alice-corp", "tools"),
        repo("alice", "notes"),
        repo("bob", "secret"),
    ]]);
    let summary = engine(&git, &root, SyncMode::Clone, "alice")
        .run(&mut source)
        .await
        .unwrap();

    assert_eq!(summary.cloned, 2);
    assert_eq!(summary.skipped, 1);
    root.child("u").child("tools").assert(predicate::path::is_dir());
    root.child("u").child("notes").assert(predicate::path::is_dir());
    root.child("u").child("secret").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_filtered_repository_creates_no_directory() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();

    let outcome = engine(&git, &root, SyncMode::Mirror, "carol")
        .sync_repository(&repo("dave", "stuff"))
        .await;

    assert_eq!(outcome, SyncOutcome::Filtered);
    assert!(git.calls().is_empty());
    root.child("u").assert(predicate::path::missing());
}

#[tokio::test]
async fn test_listing_failure_keeps_earlier_work() {
    let server = MockServer::start().await;
    let next = format!(r#"<{}/user/repos?page=2>; rel="next""#, server.uri());

    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([repo_json("u", "first")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();
    let client = GitHubClient::new(&server.uri(), "t").unwrap();
    let mut pages = client.repositories();

    let result = engine(&git, &root, SyncMode::Clone, "").run(&mut pages).await;

    assert_matches!(result, Err(Error::Api { .. }));
    root.child("u").child("first").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_invalid_name_aborts_after_earlier_repositories_are_synced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([repo_json("u", "fine"), repo_json("u", "../evil")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();
    let client = GitHubClient::new(&server.uri(), "t").unwrap();
    let mut pages = client.repositories();

    let result = engine(&git, &root, SyncMode::Clone, "").run(&mut pages).await;

    assert_matches!(result, Err(Error::Validation { name }) if name == "../evil");
    assert_eq!(
        git.calls(),
        vec![GitCall::Clone {
            url: "https://u:t@github.com/u/fine.git".to_string(),
            path: root.child("u").child("fine").path().to_path_buf(),
        }]
    );
    root.child("u").child("fine").assert(predicate::path::is_dir());
}

#[tokio::test]
async fn test_backup_run_over_paginated_api() {
    let server = MockServer::start().await;
    let next = format!(r#"<{}/user/repos?page=2>; rel="next""#, server.uri());

    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("per_page", "100"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Link", next.as_str())
                .set_body_json(json!([repo_json("u", "one"), repo_json("org", "two")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/repos"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([repo_json("u", "three")])))
        .expect(1)
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    root.child("u").child("three").create_dir_all().unwrap();
    let git = RecordingGit::new();
    let client = GitHubClient::new(&server.uri(), "t").unwrap();
    let mut pages = client.repositories();

    let summary = engine(&git, &root, SyncMode::Mirror, "")
        .run(&mut pages)
        .await
        .unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.mirrored, 2);
    assert_eq!(summary.unchanged, 1);

    let inits = git
        .calls()
        .iter()
        .filter(|call| matches!(call, GitCall::InitBare { .. }))
        .count();
    let fetches = git
        .calls()
        .iter()
        .filter(|call| matches!(call, GitCall::FetchMirror { .. }))
        .count();
    assert_eq!((inits, fetches), (2, 2));
}

#[tokio::test]
async fn test_dry_run_touches_nothing() {
    let root = TempDir::new().unwrap();
    let git = RecordingGit::new();

    let mut source = StaticPages::new(vec![vec![repo("me", "x")], vec![repo("me", "y")]]);
    let summary = engine(&git, &root, SyncMode::Clone, "")
        .with_dry_run(true)
        .run(&mut source)
        .await
        .unwrap();

    assert_eq!(summary.planned, 2);
    assert!(git.calls().is_empty());
    root.child("u").assert(predicate::path::missing());
}
