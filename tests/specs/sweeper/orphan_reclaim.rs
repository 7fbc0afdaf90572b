//! Scenario 6: sweeper orphan reclaim (spec §8).

use crate::prelude::*;
use tyger_core::BufferParameters;
use tyger_storage::Repository;

#[tokio::test]
async fn run_with_no_backend_objects_past_grace_period_is_deleted_on_one_sweep() {
    let h = harness();
    put_job_codespec(&h.repository, "hello", 0, BufferParameters::default()).await;

    h.backend.fail_next_create("engine unreachable");
    let err = h.creator.create(new_run("hello", None)).await.unwrap_err();
    assert!(err.to_string().contains("engine unreachable") || matches!(err, tyger_engine::EngineError::Backend(_)));

    let orphans = h.repository.get_page_of_runs_where_resources_not_created().await.expect("query succeeds");
    assert_eq!(orphans.len(), 1);
    let run_id = orphans[0].id;

    h.clock.advance(chrono::Duration::minutes(10));
    h.sweeper.sweep_once().await;

    assert!(h.repository.get_run(run_id).await.expect("read succeeds").is_none());
    assert!(h.backend.is_removed(run_id));
}
