//! Scenario 4: cancel a running Run (spec §8).

use crate::prelude::*;
use tyger_backend::{ContainerObservation, ContainerState};
use tyger_core::{BufferParameters, Clock, RunStatus};
use tyger_storage::Repository;

#[tokio::test]
async fn local_backend_cancel_completes_synchronously_then_sweeper_finalizes() {
    let h = harness();
    put_job_codespec(&h.repository, "sleeper", 0, BufferParameters::default()).await;
    let run = h.creator.create(new_run("sleeper", None)).await.expect("run is created");

    h.backend.set_observations(
        run.id,
        vec![ContainerObservation {
            name: format!("tyger-run-{}-main", run.id),
            role: "main".to_string(),
            state: ContainerState::Running,
            started_at: Some(h.clock.now()),
            finished_at: None,
        }],
    );

    let canceled = h.updater.cancel_run(run.id).await.expect("cancel succeeds");
    assert_eq!(canceled.status, RunStatus::Canceled);
    assert!(h.backend.is_canceled(run.id));

    h.backend.push_terminal_group(run.id);
    h.sweeper.sweep_once().await;

    let record = h.repository.get_run(run.id).await.expect("read succeeds").expect("run still present");
    assert!(record.logs_archived_at.is_some());

    h.sweeper.sweep_once().await;
    assert!(h.backend.is_removed(run.id));
    let record = h.repository.get_run(run.id).await.expect("read succeeds").expect("run still present");
    assert!(record.r#final);
}

#[tokio::test]
async fn cluster_backend_cancel_moves_through_canceling_before_canceled() {
    let h = harness();
    put_job_codespec(&h.repository, "sleeper", 0, BufferParameters::default()).await;
    let run = h.creator.create(new_run("sleeper", None)).await.expect("run is created");
    h.backend.set_synchronous_cancel(false);

    let canceling = h.updater.cancel_run(run.id).await.expect("cancel succeeds");
    assert_eq!(canceling.status, RunStatus::Canceling);

    // A controller would later propagate the cancel and move to
    // Canceled; the updater itself only initiates it asynchronously.
    h.repository
        .update_run(run.id, None, None, None, Some((RunStatus::Canceled, None)))
        .await
        .expect("transition to canceled");
    let record = h.repository.get_run(run.id).await.expect("read succeeds").expect("run still present");
    assert_eq!(record.run.status, RunStatus::Canceled);
}
