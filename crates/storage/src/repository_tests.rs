use super::*;
use std::collections::HashMap;
use tyger_core::{CodespecKind, FakeClock, JobTarget, Resources};

fn clock() -> FakeClock {
    FakeClock::new("2024-01-01T00:00:00Z".parse().unwrap())
}

fn new_run() -> NewRun {
    NewRun {
        job: JobTarget {
            codespec_ref: "hello".to_string(),
            replicas: 1,
            node_pool: None,
            buffers: HashMap::new(),
            tags: HashMap::new(),
            prefer_tcp_buffers: false,
        },
        worker: None,
        cluster: None,
        tags: HashMap::new(),
        timeout_seconds: None,
    }
}

#[tokio::test]
async fn create_run_assigns_monotonically_increasing_ids() {
    let repo = InMemoryRepository::new(clock());
    let first = repo.create_run(new_run()).await.unwrap();
    let second = repo.create_run(new_run()).await.unwrap();
    assert!(second.id.get() > first.id.get());
}

#[tokio::test]
async fn created_run_starts_pending_with_resources_not_created() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    assert_eq!(run.status, RunStatus::Pending);
    let record = repo.get_run(run.id).await.unwrap().unwrap();
    assert!(!record.resources_created);
    assert!(!record.is_final());
}

#[tokio::test]
async fn update_run_sets_resources_created() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    repo.update_run(run.id, Some(true), None, None, None).await.unwrap();
    let record = repo.get_run(run.id).await.unwrap().unwrap();
    assert!(record.resources_created);
}

#[tokio::test]
async fn update_run_rejects_invalid_status_transition() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    let err = repo
        .update_run(run.id, None, None, None, Some((RunStatus::Succeeded, None)))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Unavailable(_)));
}

#[tokio::test]
async fn update_run_sets_started_at_on_first_running_transition() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    repo.update_run(run.id, None, None, None, Some((RunStatus::Running, None)))
        .await
        .unwrap();
    let record = repo.get_run(run.id).await.unwrap().unwrap();
    assert!(record.run.started_at.is_some());
}

#[tokio::test]
async fn final_run_rejects_further_status_updates() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    repo.update_run(run.id, None, None, None, Some((RunStatus::Running, None)))
        .await
        .unwrap();
    repo.update_run(
        run.id,
        None,
        None,
        None,
        Some((RunStatus::Succeeded, None)),
    )
    .await
    .unwrap();
    repo.update_run(run.id, None, None, Some(true), None).await.unwrap();

    let err = repo
        .update_run(run.id, None, None, None, Some((RunStatus::Failed, None)))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::AlreadyFinal(_)));
}

#[tokio::test]
async fn delete_run_removes_the_record() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    repo.delete_run(run.id).await.unwrap();
    assert!(repo.get_run(run.id).await.unwrap().is_none());
}

#[tokio::test]
async fn get_page_of_runs_where_resources_not_created_only_returns_pending_launch() {
    let repo = InMemoryRepository::new(clock());
    let a = repo.create_run(new_run()).await.unwrap();
    let b = repo.create_run(new_run()).await.unwrap();
    repo.update_run(b.id, Some(true), None, None, None).await.unwrap();

    let pending = repo.get_page_of_runs_where_resources_not_created().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, a.id);
}

#[tokio::test]
async fn codespec_lookup_returns_highest_version_for_latest() {
    let repo = InMemoryRepository::new(clock());
    for version in 1..=3 {
        repo.put_codespec(Codespec {
            name: "hello".to_string(),
            version,
            kind: CodespecKind::Job,
            image: "busybox".to_string(),
            command: vec![],
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            resources: Resources::default(),
            buffers: Default::default(),
            sockets: vec![],
        })
        .await
        .unwrap();
    }
    let latest = repo.get_latest_codespec("hello").await.unwrap().unwrap();
    assert_eq!(latest.version, 3);

    let exact = repo.get_codespec_at_version("hello", 2).await.unwrap().unwrap();
    assert_eq!(exact.version, 2);

    assert!(repo.get_codespec_at_version("hello", 9).await.unwrap().is_none());
}

#[tokio::test]
async fn update_tags_increments_version_and_publishes_event() {
    let repo = InMemoryRepository::new(clock());
    let run = repo.create_run(new_run()).await.unwrap();
    let mut rx = repo.subscribe_changes();

    let mut tags = HashMap::new();
    tags.insert("env".to_string(), "prod".to_string());
    let version = repo.update_tags(run.id, tags).await.unwrap();
    assert_eq!(version, 1);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.run_id, run.id);
}
