//! Scenario 2: GPU mismatch rejects the Run before creation (spec §8).

use crate::prelude::*;
use tyger_core::{BufferParameters, ValidationError};
use tyger_engine::EngineError;
use tyger_storage::Repository;

#[tokio::test]
async fn gpu_codespec_pinned_to_a_cpu_only_pool_is_rejected() {
    let h = harness();
    put_job_codespec(&h.repository, "needs-gpu", 1, BufferParameters::default()).await;

    let err = h.creator.create(new_run("needs-gpu", Some("cpunp"))).await.unwrap_err();

    assert!(matches!(err, EngineError::Validation(ValidationError::GpuMismatch { pool, requested })
        if pool == "cpunp" && requested == 1));

    let runs = h.repository.get_page_of_runs_where_resources_not_created().await.expect("query succeeds");
    assert!(runs.is_empty(), "no Run should have been created on validation failure");
}
