//! Scenario 5: log merge ordering (spec §8) — exact merged output for two
//! interleaved container streams.

use tokio::sync::mpsc;
use tyger_engine::{FixedLogMerger, LogOptions, LogSource};

fn source(label: &str, raw: &str) -> LogSource {
    let lines: Vec<&str> = raw.lines().collect();
    let (tx, rx) = mpsc::channel(lines.len().max(1));
    for line in lines {
        tx.try_send(Ok(line.as_bytes().to_vec())).expect("channel has capacity");
    }
    drop(tx);
    LogSource::new(Some(label.to_string()), rx)
}

#[tokio::test]
async fn two_container_streams_merge_in_strict_timestamp_order() {
    let a = source("[A]", "2024-01-01T00:00:00.000Z a1\n2024-01-01T00:00:02.000Z a2\n");
    let b = source("[B]", "2024-01-01T00:00:01.000Z b1\n");

    let opts = LogOptions { include_timestamps: false, ..Default::default() };
    let merged = FixedLogMerger::merge(vec![a, b], &opts).await.expect("merge succeeds");

    let lines: Vec<&str> = merged.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(lines, vec!["[A] a1", "[B] b1", "[A] a2"]);
}
