use super::*;
use crate::log_pipeline::InMemoryLogArchive;
use std::collections::HashMap;
use tyger_backend::{ContainerObservation, ContainerState, FakeBackendDriver};
use tyger_core::{Clock, FakeClock, JobTarget, NewRun, RunStatus};
use tyger_storage::InMemoryRepository;

fn test_config() -> SweepConfig {
    SweepConfig {
        interval: Duration::from_millis(10),
        orphan_grace: ChronoDuration::zero(),
        min_archive_lag_before_delete: ChronoDuration::zero(),
    }
}

async fn new_run(repository: &InMemoryRepository<FakeClock>) -> RunId {
    repository
        .create_run(NewRun {
            job: JobTarget { codespec_ref: "hello".to_string(), replicas: 1, node_pool: None, buffers: HashMap::new(), tags: HashMap::new(), prefer_tcp_buffers: false },
            worker: None,
            cluster: None,
            tags: HashMap::new(),
            timeout_seconds: None,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn drains_orphan_run_past_grace_period() {
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    let archive = Arc::new(InMemoryLogArchive::default());
    let id = new_run(&repository).await;

    let sweeper = RunSweeper::new(repository.clone(), backend.clone(), archive, test_config(), clock);
    sweeper.sweep_once().await;

    assert!(repository.get_run(id).await.unwrap().is_none());
    assert!(backend.is_removed(id));
}

#[tokio::test]
async fn archives_logs_for_a_terminal_run_then_leaves_final_false() {
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    let archive = Arc::new(InMemoryLogArchive::default());
    let id = new_run(&repository).await;
    repository.update_run(id, Some(true), None, None, Some((RunStatus::Failed, Some("boom".to_string())))).await.unwrap();
    backend.set_observations(id, vec![ContainerObservation {
        name: "main".to_string(),
        role: "main".to_string(),
        state: ContainerState::Exited { exit_code: 1 },
        started_at: None,
        finished_at: None,
    }]);
    backend.set_log_lines(id, vec!["2026-01-01T00:00:00Z boom"]);
    backend.push_terminal_group(id);

    let sweeper = RunSweeper::new(repository.clone(), backend.clone(), archive.clone(), test_config(), clock);
    sweeper.sweep_once().await;

    let record = repository.get_run(id).await.unwrap().unwrap();
    assert!(record.logs_archived_at.is_some());
    assert!(!record.r#final);
    let lines = archive.fetch(id).await.unwrap();
    assert_eq!(lines.len(), 1);
}

#[tokio::test]
async fn finalizes_run_once_archive_lag_has_passed() {
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    let archive = Arc::new(InMemoryLogArchive::default());
    let id = new_run(&repository).await;
    repository.update_run(id, Some(true), None, None, Some((RunStatus::Failed, None))).await.unwrap();
    repository.update_run(id, None, Some(clock.now() - ChronoDuration::minutes(1)), None, None).await.unwrap();
    backend.push_terminal_group(id);

    let sweeper = RunSweeper::new(repository.clone(), backend.clone(), archive, test_config(), clock);
    sweeper.sweep_once().await;

    let record = repository.get_run(id).await.unwrap().unwrap();
    assert!(record.r#final);
    assert!(backend.is_removed(id));
}

#[tokio::test]
async fn non_terminal_run_in_terminal_group_list_is_left_alone() {
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    let archive = Arc::new(InMemoryLogArchive::default());
    let id = new_run(&repository).await;
    repository.update_run(id, Some(true), None, None, None).await.unwrap();
    backend.push_terminal_group(id);

    let sweeper = RunSweeper::new(repository.clone(), backend.clone(), archive, test_config(), clock);
    sweeper.sweep_once().await;

    let record = repository.get_run(id).await.unwrap().unwrap();
    assert!(record.logs_archived_at.is_none());
    assert!(!backend.is_removed(id));
}

#[tokio::test]
async fn one_failing_run_does_not_block_the_rest_of_the_cycle() {
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock.clone()));
    let backend = Arc::new(FakeBackendDriver::new());
    let archive = Arc::new(InMemoryLogArchive::default());
    let missing_id = RunId::new(999999);
    backend.push_terminal_group(missing_id);

    let id = new_run(&repository).await;
    repository.update_run(id, Some(true), None, None, None).await.unwrap();
    repository.update_run(id, None, None, None, Some((RunStatus::Failed, None))).await.unwrap();
    backend.push_terminal_group(id);

    let sweeper = RunSweeper::new(repository.clone(), backend.clone(), archive, test_config(), clock);
    sweeper.sweep_once().await;

    assert!(backend.is_removed(missing_id));
    let record = repository.get_run(id).await.unwrap().unwrap();
    assert!(record.logs_archived_at.is_some());
}
