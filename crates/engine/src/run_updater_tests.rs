use super::*;
use std::collections::HashMap;
use tyger_backend::FakeBackendDriver;
use tyger_core::{FakeClock, JobTarget, NewRun, RunStatus};
use tyger_storage::InMemoryRepository;

async fn setup() -> (RunUpdater<InMemoryRepository<FakeClock>, FakeBackendDriver>, Arc<InMemoryRepository<FakeClock>>, Arc<FakeBackendDriver>, tyger_core::RunId)
{
    let clock = FakeClock::new("2026-01-01T00:00:00Z".parse().unwrap());
    let repository = Arc::new(InMemoryRepository::new(clock));
    let backend = Arc::new(FakeBackendDriver::new());
    let run = repository
        .create_run(NewRun {
            job: JobTarget { codespec_ref: "hello".to_string(), replicas: 1, node_pool: None, buffers: HashMap::new(), tags: HashMap::new(), prefer_tcp_buffers: false },
            worker: None,
            cluster: None,
            tags: HashMap::new(),
            timeout_seconds: None,
        })
        .await
        .unwrap();
    let updater = RunUpdater::new(repository.clone(), backend.clone());
    (updater, repository, backend, run.id)
}

#[tokio::test]
async fn local_backend_synchronous_cancel_reaches_canceled() {
    let (updater, repository, backend, id) = setup().await;
    backend.set_synchronous_cancel(true);

    let run = updater.cancel_run(id).await.unwrap();

    assert_eq!(run.status, RunStatus::Canceled);
    assert!(backend.is_canceled(id));
    let record = repository.get_run(id).await.unwrap().unwrap();
    assert_eq!(record.run.status, RunStatus::Canceled);
}

#[tokio::test]
async fn cluster_backend_async_cancel_stops_at_canceling() {
    let (updater, repository, backend, id) = setup().await;
    backend.set_synchronous_cancel(false);

    let run = updater.cancel_run(id).await.unwrap();

    assert_eq!(run.status, RunStatus::Canceling);
    let record = repository.get_run(id).await.unwrap().unwrap();
    assert_eq!(record.run.status, RunStatus::Canceling);
}

#[tokio::test]
async fn cancel_on_already_terminal_run_is_a_no_op() {
    let (updater, repository, backend, id) = setup().await;
    repository.update_run(id, None, None, Some(true), Some((RunStatus::Failed, None))).await.unwrap();

    let run = updater.cancel_run(id).await.unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn cancel_on_unknown_run_is_not_found() {
    let (updater, _repository, _backend, _id) = setup().await;
    let err = updater.cancel_run(tyger_core::RunId::new(424242)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
