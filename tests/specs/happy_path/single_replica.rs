//! Scenario 1: happy path single-replica job (spec §8).

use crate::prelude::*;
use tyger_backend::{ContainerObservation, ContainerState};
use tyger_core::{BufferId, BufferParameters, Clock, RunStatus};

#[tokio::test]
async fn single_replica_job_runs_to_success_with_two_containers() {
    let h = harness();
    let mut buffers = BufferParameters::default();
    buffers.outputs.push("out".to_string());
    put_job_codespec(&h.repository, "hello", 0, buffers).await;

    let mut request = new_run("hello", None);
    request.job.buffers.insert("out".to_string(), BufferId::new("buf-123"));

    let run = h.creator.create(request).await.expect("run is created");
    assert_eq!(run.status, RunStatus::Pending);

    h.backend.set_observations(
        run.id,
        vec![
            ContainerObservation {
                name: format!("tyger-run-{}-main", run.id),
                role: "main".to_string(),
                state: ContainerState::Running,
                started_at: Some(h.clock.now()),
                finished_at: None,
            },
            ContainerObservation {
                name: format!("tyger-run-{}-out-buffer-sidecar", run.id),
                role: "out-buffer-sidecar".to_string(),
                state: ContainerState::Running,
                started_at: Some(h.clock.now()),
                finished_at: None,
            },
        ],
    );

    let augmented = h.reader.get_run(run.id).await.expect("read succeeds").expect("run exists");
    assert_eq!(augmented.run.status, RunStatus::Running);
    assert_eq!(augmented.run.job.buffers.len(), 1);

    h.clock.advance(chrono::Duration::seconds(2));
    h.backend.set_container_state(run.id, &format!("tyger-run-{}-main", run.id), ContainerState::Exited { exit_code: 0 });
    h.backend.set_container_state(
        run.id,
        &format!("tyger-run-{}-out-buffer-sidecar", run.id),
        ContainerState::Exited { exit_code: 0 },
    );

    let augmented = h.reader.get_run(run.id).await.expect("read succeeds").expect("run exists");
    assert_eq!(augmented.run.status, RunStatus::Succeeded);

    let finished = augmented.run.finished_at.expect("succeeded run has finishedAt");
    let started = augmented.run.started_at.expect("succeeded run has startedAt");
    assert!(finished - started <= chrono::Duration::seconds(5));
}
