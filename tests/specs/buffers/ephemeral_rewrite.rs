//! Scenario 3: ephemeral buffer rewrite (spec §8).

use crate::prelude::*;
use tyger_core::{BufferId, BufferParameters};
use tyger_storage::Repository;

#[tokio::test]
async fn ephemeral_request_id_is_rewritten_against_the_assigned_run_id() {
    let h = harness();
    let mut buffers = BufferParameters::default();
    buffers.outputs.push("out".to_string());
    put_job_codespec(&h.repository, "writer", 0, buffers).await;

    let mut request = new_run("writer", None);
    request.job.buffers.insert("out".to_string(), BufferId::new("temp-x"));

    let run = h.creator.create(request).await.expect("run is created");

    let expected = BufferId::new(format!("run-{}-temp-x", run.id));
    assert_eq!(run.job.buffers.get("out"), Some(&expected));

    let record = h.repository.get_run(run.id).await.expect("read succeeds").expect("run exists");
    assert_eq!(record.run.job.buffers.get("out"), Some(&expected));
}
