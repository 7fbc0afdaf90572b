// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Assembles the backend workload graph for a Run from its resolved
//! Codespec and buffer bindings (spec §4.1.1): the main container, one
//! sidecar per declared buffer parameter, one sidecar per declared
//! socket, and optional worker replicas.

use std::collections::HashMap;
use tyger_backend::{ContainerSpec, VolumeMount, WorkloadSpec};
use tyger_core::{env_expand, labels, BufferId, Codespec, ContainerRole, JobTarget, Resources, RunId, WorkerTarget};

const SHARED_VOLUME: &str = "run-shared";
const PIPE_MOUNT_ROOT: &str = "/run/tyger/pipes";
const ACCESS_FILE_MOUNT_ROOT: &str = "/run/tyger/access-files";

/// The resolved buffer URLs for one parameter, keyed by parameter name.
pub struct ResolvedBuffer {
    pub buffer_id: BufferId,
    pub access_url: String,
    pub is_ephemeral: bool,
}

pub struct WorkloadGraphInput<'a> {
    pub run_id: RunId,
    pub codespec: &'a Codespec,
    pub job: &'a JobTarget,
    pub worker: Option<&'a WorkerTarget>,
    pub worker_codespec: Option<&'a Codespec>,
    pub cluster: Option<String>,
    pub resolved_buffers: &'a HashMap<String, ResolvedBuffer>,
    pub worker_dns_names: Vec<String>,
    /// Per-Run enforcement deadline (spec §5: "if absent, Runs run
    /// indefinitely"), carried through to the backend object.
    pub timeout_seconds: Option<i64>,
}

fn apply_gpu(resources: &Resources) -> u32 {
    resources.gpu
}

fn pipe_path(param: &str) -> String {
    format!("{PIPE_MOUNT_ROOT}/{param}")
}

fn access_file_path(param: &str) -> String {
    format!("{ACCESS_FILE_MOUNT_ROOT}/{param}")
}

/// Builds the main container, expanding `$(VAR)` references in
/// command/args/env against the Codespec's own declared env (spec
/// §4.1.1 paragraph 1).
fn build_main_container(
    run_id: RunId,
    codespec: &Codespec,
    resolved_buffers: &HashMap<String, ResolvedBuffer>,
    worker_dns_names: &[String],
) -> ContainerSpec {
    let mut env = env_expand::expand_map(&codespec.env, &codespec.env);
    for param in codespec.buffers.inputs.iter().chain(codespec.buffers.outputs.iter()) {
        env.insert(format!("{}_PIPE", param.to_uppercase()), pipe_path(param));
    }
    if !worker_dns_names.is_empty() {
        env.insert("WORKER_NODES".to_string(), worker_dns_names.join(","));
    }

    let mut labels_map = HashMap::new();
    let (run_key, run_val) = labels::run_label(run_id);
    labels_map.insert(run_key.to_string(), run_val);
    labels_map.insert(
        labels::LABEL_CONTAINER_NAME.to_string(),
        labels::container_role_label(&ContainerRole::Main).1,
    );
    if !codespec.sockets.is_empty() {
        labels_map.insert(labels::LABEL_SOCKET_COUNT.to_string(), codespec.sockets.len().to_string());
    }

    let mounts = codespec
        .buffers
        .inputs
        .iter()
        .chain(codespec.buffers.outputs.iter())
        .map(|param| VolumeMount {
            volume_name: SHARED_VOLUME.to_string(),
            mount_path: pipe_path(param),
            read_only: false,
        })
        .collect();

    let _ = resolved_buffers;
    ContainerSpec {
        name: "main".to_string(),
        image: codespec.image.clone(),
        command: env_expand::expand_vec(&codespec.command, &env),
        args: env_expand::expand_vec(&codespec.args, &env),
        env,
        working_dir: codespec.working_dir.clone(),
        mounts,
        ports: codespec.sockets.iter().map(|s| s.port).collect(),
        labels: labels_map,
        gpu_request: apply_gpu(&codespec.resources),
    }
}

fn build_buffer_sidecar(
    run_id: RunId,
    param: &str,
    resolved: &ResolvedBuffer,
    is_input: bool,
) -> ContainerSpec {
    let role = ContainerRole::BufferSidecar(param.to_string());
    let mut labels_map = HashMap::new();
    let (run_key, run_val) = labels::run_label(run_id);
    labels_map.insert(run_key.to_string(), run_val);
    labels_map.insert(labels::LABEL_CONTAINER_NAME.to_string(), labels::container_role_label(&role).1);

    let mode = if resolved.is_ephemeral {
        "relay"
    } else if is_input {
        "input"
    } else {
        "output"
    };

    if resolved.is_ephemeral {
        labels_map.insert(labels::LABEL_EPHEMERAL_BUFFER_ID.to_string(), resolved.buffer_id.to_string());
        labels_map.insert(
            labels::LABEL_EPHEMERAL_BUFFER_SOCKET_PATH.to_string(),
            format!("/run/tyger/ephemeral/{}.sock", resolved.buffer_id),
        );
    }

    ContainerSpec {
        name: format!("{param}-buffer-sidecar"),
        image: "tyger-sidecar:latest".to_string(),
        command: vec!["tyger-sidecar".to_string(), mode.to_string()],
        args: vec!["--pipe".to_string(), pipe_path(param), "--access-file".to_string(), access_file_path(param)],
        env: HashMap::new(),
        working_dir: None,
        mounts: vec![
            VolumeMount { volume_name: SHARED_VOLUME.to_string(), mount_path: pipe_path(param), read_only: false },
        ],
        ports: if resolved.is_ephemeral { vec![8080] } else { vec![] },
        labels: labels_map,
        gpu_request: 0,
    }
}

fn build_socket_sidecar(run_id: RunId, port: u16) -> ContainerSpec {
    let role = ContainerRole::SocketSidecar(port);
    let mut labels_map = HashMap::new();
    let (run_key, run_val) = labels::run_label(run_id);
    labels_map.insert(run_key.to_string(), run_val);
    labels_map.insert(labels::LABEL_CONTAINER_NAME.to_string(), labels::container_role_label(&role).1);

    ContainerSpec {
        name: format!("socket-{port}-sidecar"),
        image: "tyger-sidecar:latest".to_string(),
        command: vec!["tyger-sidecar".to_string(), "socket".to_string()],
        args: vec!["--port".to_string(), port.to_string()],
        env: HashMap::new(),
        working_dir: None,
        mounts: vec![VolumeMount {
            volume_name: SHARED_VOLUME.to_string(),
            mount_path: "/run/tyger/pipes".to_string(),
            read_only: false,
        }],
        ports: vec![port],
        labels: labels_map,
        gpu_request: 0,
    }
}

fn build_worker_replica(run_id: RunId, index: usize, codespec: &Codespec) -> ContainerSpec {
    let mut labels_map = HashMap::new();
    let (run_key, run_val) = labels::run_label(run_id);
    labels_map.insert(run_key.to_string(), run_val);
    labels_map.insert(labels::LABEL_CONTAINER_NAME.to_string(), format!("worker-{index}"));

    ContainerSpec {
        name: format!("worker-{index}"),
        image: codespec.image.clone(),
        command: codespec.command.clone(),
        args: codespec.args.clone(),
        env: codespec.env.clone(),
        working_dir: codespec.working_dir.clone(),
        mounts: vec![],
        ports: vec![],
        labels: labels_map,
        gpu_request: apply_gpu(&codespec.resources),
    }
}

/// Assembles the full [`WorkloadSpec`] for one Run (spec §4.1.1).
pub fn assemble(input: WorkloadGraphInput<'_>) -> WorkloadSpec {
    let mut sidecars = Vec::new();
    for param in &input.codespec.buffers.inputs {
        if let Some(resolved) = input.resolved_buffers.get(param) {
            sidecars.push(build_buffer_sidecar(input.run_id, param, resolved, true));
        }
    }
    for param in &input.codespec.buffers.outputs {
        if let Some(resolved) = input.resolved_buffers.get(param) {
            sidecars.push(build_buffer_sidecar(input.run_id, param, resolved, false));
        }
    }
    for socket in &input.codespec.sockets {
        sidecars.push(build_socket_sidecar(input.run_id, socket.port));
    }

    let worker_replicas = match (input.worker, input.worker_codespec) {
        (Some(worker), Some(worker_codespec)) => (0..worker.replicas)
            .map(|i| build_worker_replica(input.run_id, i as usize, worker_codespec))
            .collect(),
        _ => Vec::new(),
    };

    let main = build_main_container(input.run_id, input.codespec, input.resolved_buffers, &input.worker_dns_names);

    let shared_network = if input.codespec.sockets.is_empty() {
        None
    } else {
        Some(format!("tyger-run-{}-net", input.run_id))
    };

    let mut top_labels = HashMap::new();
    let (run_key, run_val) = labels::run_label(input.run_id);
    top_labels.insert(run_key.to_string(), run_val);
    let (local_key, local_val) = labels::local_run_label(input.run_id);
    top_labels.insert(local_key.to_string(), local_val);

    WorkloadSpec {
        run_id: input.run_id,
        cluster: input.cluster,
        node_pool: input.job.node_pool.clone(),
        main,
        sidecars,
        worker_replicas,
        shared_network,
        timeout_seconds: input.timeout_seconds,
        labels: top_labels,
    }
}

#[cfg(test)]
#[path = "workload_graph_tests.rs"]
mod tests;
