use std::path::PathBuf;
use std::time::Duration;

use sluice_config::{CheckpointSettings, InitialPosition};
use sluice_model::encode_frame;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{FileSource, RawRecord, RecordSource};

fn settings() -> CheckpointSettings {
    CheckpointSettings {
        max_batch_size: 1,
        max_batch_wait: Duration::from_millis(20),
    }
}

fn stream_file(dir: &TempDir, payloads: &[&[u8]]) -> PathBuf {
    let path = dir.path().join("raw.frames");
    let mut bytes = Vec::new();
    for payload in payloads {
        bytes.extend_from_slice(&encode_frame("", payload));
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

async fn collect(
    source: FileSource,
    count: usize,
) -> (Vec<RawRecord>, CancellationToken, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let cancel_clone = cancel.clone();
    let task = tokio::spawn(async move {
        Box::new(source).run(tx, cancel_clone).await.unwrap();
    });

    let mut records = Vec::new();
    for _ in 0..count {
        let record = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("record within timeout")
            .expect("channel open");
        records.push(record);
    }

    (records, cancel, task)
}

#[tokio::test]
async fn reads_frames_from_the_start_with_trim_horizon() {
    let dir = tempfile::tempdir().unwrap();
    let path = stream_file(&dir, &[b"one", b"two", b"three"]);

    let source = FileSource::new(path, InitialPosition::TrimHorizon, settings());
    let (records, cancel, task) = collect(source, 3).await;

    let payloads: Vec<Vec<u8>> = records.iter().map(|r| r.data.to_vec()).collect();
    assert_eq!(payloads, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);

    cancel.cancel();
    // The source drains checkpoints only after every ack handle is gone.
    drop(records);
    task.await.unwrap();
}

#[tokio::test]
async fn latest_skips_existing_records_and_tails_new_ones() {
    let dir = tempfile::tempdir().unwrap();
    let path = stream_file(&dir, &[b"old"]);

    let source = FileSource::new(path.clone(), InitialPosition::Latest, settings());
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let task = tokio::spawn(async move {
        Box::new(source).run(tx, cancel_clone).await.unwrap();
    });

    // Nothing yet: the old record is behind the start position.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());

    // Appended records are picked up by the tail loop.
    let mut existing = std::fs::read(&path).unwrap();
    existing.extend_from_slice(&encode_frame("", b"new"));
    std::fs::write(&path, existing).unwrap();

    let record = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&record.data[..], b"new");

    cancel.cancel();
    drop(record);
    task.await.unwrap();
}

#[tokio::test]
async fn acked_records_are_not_redelivered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = stream_file(&dir, &[b"one", b"two", b"three"]);

    // First run: ack the first two records, then stop.
    {
        let source = FileSource::new(path.clone(), InitialPosition::TrimHorizon, settings());
        let (records, cancel, task) = collect(source, 3).await;
        records[0].ack.ack();
        records[1].ack.ack();
        cancel.cancel();
        drop(records);
        task.await.unwrap();
    }

    // Second run resumes past the acked prefix.
    {
        let source = FileSource::new(path.clone(), InitialPosition::TrimHorizon, settings());
        let (records, cancel, task) = collect(source, 1).await;
        assert_eq!(&records[0].data[..], b"three");
        cancel.cancel();
        drop(records);
        task.await.unwrap();
    }
}

#[tokio::test]
async fn unacked_records_are_redelivered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = stream_file(&dir, &[b"one", b"two"]);

    {
        let source = FileSource::new(path.clone(), InitialPosition::TrimHorizon, settings());
        let (records, cancel, task) = collect(source, 2).await;
        // No acks at all.
        cancel.cancel();
        drop(records);
        task.await.unwrap();
    }

    {
        let source = FileSource::new(path.clone(), InitialPosition::TrimHorizon, settings());
        let (records, cancel, task) = collect(source, 2).await;
        assert_eq!(&records[0].data[..], b"one", "nothing acked, full replay");
        cancel.cancel();
        drop(records);
        task.await.unwrap();
    }
}

#[tokio::test]
async fn corrupt_stream_is_a_fatal_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("raw.frames");
    // Frame length far beyond the limit.
    std::fs::write(&path, ((64u32 * 1024 * 1024).to_be_bytes()).to_vec()).unwrap();

    let source = FileSource::new(path, InitialPosition::TrimHorizon, settings());
    let (tx, _rx) = mpsc::channel(16);
    let result = Box::new(source).run(tx, CancellationToken::new()).await;
    assert!(result.is_err());
}
