// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LogSource, LogMerger, LogLineFormatter (spec §4.5): merges per-container
//! log streams into one ordered pipeline, with a fixed (read-to-end) and
//! a live (follow) variant.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tyger_backend::BackendError;
use tyger_core::RunId;

/// Request parameters for `GetLogs` (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub include_timestamps: bool,
    pub tail_lines: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub follow: bool,
    pub previous: bool,
}

/// One merged, formatted output line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub source_index: usize,
    pub text: String,
}

/// A single container's raw log stream, tagged with the role label its
/// lines get prefixed with (spec §4.5: `[main]`, `[<param>-buffer-sidecar]`,
/// `[job-<index>]`, `[worker-<index>]`, or none for a single-replica,
/// no-sidecar Run).
pub struct LogSource {
    pub label: Option<String>,
    receiver: mpsc::Receiver<Result<Vec<u8>, BackendError>>,
}

impl LogSource {
    pub fn new(label: Option<String>, receiver: mpsc::Receiver<Result<Vec<u8>, BackendError>>) -> Self {
        Self { label, receiver }
    }

    async fn next_line(&mut self) -> Option<Result<String, BackendError>> {
        let chunk = self.receiver.recv().await?;
        Some(chunk.map(|bytes| String::from_utf8_lossy(&bytes).trim_end_matches(['\n', '\r']).to_string()))
    }
}

/// Synthetic sort key for a line with no parseable leading timestamp
/// (spec §4.5: "a synthetic `0001-01-01T00:00:00.000000000Z` prefix is
/// inserted to keep downstream invariants").
fn synthetic_epoch() -> DateTime<Utc> {
    match "0001-01-01T00:00:00Z".parse() {
        Ok(ts) => ts,
        Err(_) => unreachable!("constant timestamp literal is always valid"),
    }
}

/// Splits a raw log line into its leading RFC3339 timestamp and the
/// remainder. Falls back to the synthetic epoch if the leading token
/// isn't a parseable timestamp, leaving the line untouched.
pub(crate) fn split_timestamp(line: &str) -> (DateTime<Utc>, String) {
    if let Some((token, rest)) = line.split_once(' ') {
        if let Ok(ts) = DateTime::parse_from_rfc3339(token) {
            return (ts.with_timezone(&Utc), rest.to_string());
        }
    }
    (synthetic_epoch(), line.to_string())
}

/// Formats one line per `opts.include_timestamps`: `<timestamp>? <label>?
/// <rest>` (spec §4.5).
fn format_line(label: Option<&str>, timestamp: DateTime<Utc>, rest: &str, include_timestamps: bool) -> String {
    let mut out = String::new();
    if include_timestamps {
        out.push_str(&timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true));
        out.push(' ');
    }
    if let Some(label) = label {
        out.push_str(label);
        out.push(' ');
    }
    out.push_str(rest);
    out
}

/// Reads every source to completion and performs a strict k-way merge
/// by timestamp, source index breaking ties (spec §4.5).
pub struct FixedLogMerger;

impl FixedLogMerger {
    pub async fn merge(mut sources: Vec<LogSource>, opts: &LogOptions) -> Result<Vec<LogLine>, BackendError> {
        let mut buffered: Vec<(Option<String>, Vec<(DateTime<Utc>, String)>)> = Vec::with_capacity(sources.len());
        for source in &mut sources {
            let mut lines = Vec::new();
            while let Some(line) = source.next_line().await {
                let raw = line?;
                let (ts, rest) = split_timestamp(&raw);
                if opts.since.is_some_and(|since| ts < since) {
                    continue;
                }
                lines.push((ts, rest));
            }
            buffered.push((source.label.clone(), lines));
        }

        let mut heads = vec![0usize; buffered.len()];
        let mut merged = Vec::new();
        loop {
            let mut best: Option<usize> = None;
            for (i, (_, lines)) in buffered.iter().enumerate() {
                if heads[i] >= lines.len() {
                    continue;
                }
                match best {
                    None => best = Some(i),
                    Some(b) if lines[heads[i]].0 < buffered[b].1[heads[b]].0 => best = Some(i),
                    _ => {}
                }
            }
            let Some(i) = best else { break };
            let (ts, rest) = buffered[i].1[heads[i]].clone();
            let label = buffered[i].0.clone();
            merged.push(LogLine {
                timestamp: ts,
                source_index: i,
                text: format_line(label.as_deref(), ts, &rest, opts.include_timestamps),
            });
            heads[i] += 1;
        }

        if let Some(tail) = opts.tail_lines {
            let start = merged.len().saturating_sub(tail);
            merged = merged.split_off(start);
        }

        Ok(merged)
    }
}

/// Merges sources as they produce lines, without waiting for any source
/// to finish (spec §4.5). Preserves per-source order; global ordering
/// across sources is best-effort only. Sources may be attached after
/// the merger starts (new pods observed mid-Run).
pub struct LiveLogMerger {
    tx: mpsc::Sender<LogLine>,
    rx: Option<mpsc::Receiver<LogLine>>,
    opts: LogOptions,
    next_index: Arc<AtomicUsize>,
    complete: CancellationToken,
}

impl LiveLogMerger {
    pub fn new(opts: LogOptions) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self { tx, rx: Some(rx), opts, next_index: Arc::new(AtomicUsize::new(0)), complete: CancellationToken::new() }
    }

    /// Takes the output receiver. Returns `None` if already taken.
    pub fn take_receiver(&mut self) -> Option<mpsc::Receiver<LogLine>> {
        self.rx.take()
    }

    /// Raises the terminable-element flag (spec §4.5): when the main
    /// container of a socket-holding Run exits, the socket-main source
    /// stops waiting for more bytes and the merger winds down.
    pub fn signal_complete(&self) {
        self.complete.cancel();
    }

    /// Spawns a forwarding task for `source`; its lines flow into the
    /// shared output channel in arrival order, interleaved with other
    /// sources' lines as they each arrive.
    pub fn add_source(&self, mut source: LogSource) {
        let tx = self.tx.clone();
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let include_timestamps = self.opts.include_timestamps;
        let since = self.opts.since;
        let complete = self.complete.clone();
        tokio::spawn(async move {
            loop {
                let line = tokio::select! {
                    biased;
                    _ = complete.cancelled() => break,
                    line = source.next_line() => line,
                };
                let Some(line) = line else { break };
                let Ok(raw) = line else { break };
                let (ts, rest) = split_timestamp(&raw);
                if since.is_some_and(|since| ts < since) {
                    continue;
                }
                let text = format_line(source.label.as_deref(), ts, &rest, include_timestamps);
                if tx.send(LogLine { timestamp: ts, source_index: index, text }).await.is_err() {
                    break;
                }
            }
        });
    }
}

#[derive(Debug, Error)]
pub enum LogArchiveError {
    #[error("no archived logs for run {0}")]
    NotFound(RunId),
    #[error("archive store unavailable: {0}")]
    Unavailable(String),
}

/// Sink for terminal Runs' merged logs once `RunSweeper` archives them
/// (spec §4.3, §4.5: "If `logsArchivedAt` set, delegate to LogArchive").
/// Cloud object storage is an external collaborator (spec §1 non-goals);
/// this trait is the seam, with an in-process store for local
/// deployments and tests.
#[async_trait::async_trait]
pub trait LogArchive: Send + Sync + 'static {
    async fn archive(&self, run_id: RunId, lines: Vec<LogLine>) -> Result<(), LogArchiveError>;
    async fn fetch(&self, run_id: RunId) -> Result<Vec<LogLine>, LogArchiveError>;
}

#[derive(Default)]
pub struct InMemoryLogArchive {
    inner: Mutex<HashMap<RunId, Vec<LogLine>>>,
}

#[async_trait::async_trait]
impl LogArchive for InMemoryLogArchive {
    async fn archive(&self, run_id: RunId, lines: Vec<LogLine>) -> Result<(), LogArchiveError> {
        self.inner.lock().insert(run_id, lines);
        Ok(())
    }

    async fn fetch(&self, run_id: RunId) -> Result<Vec<LogLine>, LogArchiveError> {
        self.inner.lock().get(&run_id).cloned().ok_or(LogArchiveError::NotFound(run_id))
    }
}

#[cfg(test)]
#[path = "log_pipeline_tests.rs"]
mod tests;
