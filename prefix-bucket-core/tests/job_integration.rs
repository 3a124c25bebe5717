use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prefix_bucket_core::contract::{
    BannerRecord, MockPublisher, MockRecordSource, PublishOutcome, RecordSource, SourceError,
    WalletConnectedState,
};
use prefix_bucket_core::entry::DEFAULT_DONATION_AMOUNTS;
use prefix_bucket_core::job::{JobConfig, JobError, JobRunner};
use prefix_bucket_core::publish::{blob_key, BlobStoreConfig, PublishError, S3Publisher};
use prefix_bucket_core::queue::{JobQueue, Priority, QueueConfig};
use prefix_bucket_core::{framing, read_blob};
use serde_json::{json, Map, Value};
use tempfile::tempdir;
use tokio::sync::Notify;

fn record(id: &str, wallet_address: Option<&str>, info: Value) -> BannerRecord {
    BannerRecord {
        sha2_base16: format!("ab12{:0>60}", id.len()),
        channel_identifier: id.to_string(),
        wallet_status: WalletConnectedState::UpholdAccountKyc,
        wallet_address: wallet_address.map(str::to_owned),
        derived_site_banner_info: match info {
            Value::Object(m) => m,
            _ => Map::new(),
        },
    }
}

fn scenario_records() -> Vec<BannerRecord> {
    vec![
        record(
            "r1.example.com",
            None,
            json!({"title": "One", "donationAmounts": [1, 5, 10]}),
        ),
        record(
            "r2.example.com",
            Some("0xfeed"),
            json!({"title": "Two", "donationAmounts": [3]}),
        ),
        record(
            "r3.example.com",
            None,
            json!({"socialLinks": {"twitter": ""}}),
        ),
    ]
}

fn test_mode_publisher() -> S3Publisher {
    S3Publisher::new(BlobStoreConfig {
        region: "us-east-1".into(),
        bucket: "rewards".into(),
        test_mode: true,
        ..Default::default()
    })
}

fn scratch_config(dir: &std::path::Path) -> JobConfig {
    JobConfig {
        prefix_length: Some(4),
        scratch_dir: Some(dir.to_path_buf()),
    }
}

#[tokio::test]
async fn test_prefix_bucket_end_to_end() {
    let scratch = tempdir().unwrap();
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .times(1)
        .returning(|prefix| {
            assert_eq!(prefix, "ab12");
            Ok(scenario_records())
        });

    let published: Arc<Mutex<Vec<u8>>> = Arc::default();
    let sink = Arc::clone(&published);
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .returning(move |prefix, blob| {
            *sink.lock().unwrap() = blob;
            Ok(PublishOutcome::Uploaded {
                key: blob_key(prefix),
                etag: None,
            })
        });

    let runner = JobRunner::new(source, publisher, scratch_config(scratch.path()));
    let report = runner.run("ab12").await.expect("job should succeed");

    assert_eq!(report.entries, 3);
    assert_eq!(report.key, "publishers/prefixes/ab12");
    assert_eq!(report.outcome.key(), report.key);

    let blob = published.lock().unwrap().clone();
    assert_eq!(blob.len(), report.blob_len);
    assert_eq!(blob.len() % 1000, 0);

    let declared = u32::from_be_bytes([blob[0], blob[1], blob[2], blob[3]]) as usize;
    assert_eq!(declared, report.compressed_len);
    assert_eq!(framing::unframe(&blob).unwrap().len(), declared);

    let bundle = read_blob(&blob).expect("blob should decode");
    let ids: Vec<&str> = bundle
        .entries
        .iter()
        .map(|e| e.channel_identifier.as_str())
        .collect();
    assert_eq!(ids, vec!["r1.example.com", "r2.example.com", "r3.example.com"]);

    let r1 = &bundle.entries[0];
    assert_eq!(r1.wallet_address, None);
    assert_eq!(r1.site_banner_details.as_ref().unwrap().donation_amounts, None);

    let r2 = &bundle.entries[1];
    assert_eq!(r2.wallet_address.as_deref(), Some("0xfeed"));
    let mut expected = DEFAULT_DONATION_AMOUNTS.to_vec();
    expected.push(3.0);
    assert_eq!(
        r2.site_banner_details.as_ref().unwrap().donation_amounts,
        Some(expected)
    );

    let r3 = &bundle.entries[2];
    assert_eq!(r3.site_banner_details.as_ref().unwrap().social_links, None);

    assert_eq!(
        std::fs::read_dir(scratch.path()).unwrap().count(),
        0,
        "scratch file should be removed after a successful run"
    );
}

#[tokio::test]
async fn test_query_failure_aborts_without_publishing() {
    let scratch = tempdir().unwrap();
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .returning(|_| Err("database unavailable".into()));
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().never();

    let runner = JobRunner::new(source, publisher, scratch_config(scratch.path()));
    let err = runner.run("ab12").await.unwrap_err();

    assert!(matches!(err, JobError::Query(_)));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_publish_failure_still_cleans_scratch() {
    let scratch = tempdir().unwrap();
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .returning(|_| Ok(scenario_records()));
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().times(1).returning(|_, _| {
        Err(PublishError::Status {
            status: 403,
            body: "AccessDenied".into(),
        })
    });

    let runner = JobRunner::new(source, publisher, scratch_config(scratch.path()));
    let err = runner.run("ab12").await.unwrap_err();

    assert!(matches!(
        err,
        JobError::Publish(PublishError::Status { status: 403, .. })
    ));
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

/// Swaps the staged scratch file for a directory of the same name, so removal fails.
fn block_scratch_removal(dir: &std::path::Path) {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "exactly one scratch file while publishing");
    std::fs::remove_file(&entries[0]).unwrap();
    std::fs::create_dir(&entries[0]).unwrap();
}

#[tokio::test]
async fn test_cleanup_failure_does_not_fail_published_run() {
    let scratch = tempdir().unwrap();
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .returning(|_| Ok(scenario_records()));

    let scratch_dir = scratch.path().to_path_buf();
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .returning(move |prefix, _blob| {
            block_scratch_removal(&scratch_dir);
            Ok(PublishOutcome::Uploaded {
                key: blob_key(prefix),
                etag: Some("\"abc\"".into()),
            })
        });

    let runner = JobRunner::new(source, publisher, scratch_config(scratch.path()));
    let report = runner
        .run("ab12")
        .await
        .expect("cleanup failure must not fail the run");

    assert_eq!(report.key, "publishers/prefixes/ab12");
    assert_eq!(report.entries, 3);
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_cleanup_failure_keeps_publish_error() {
    let scratch = tempdir().unwrap();
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .returning(|_| Ok(scenario_records()));

    let scratch_dir = scratch.path().to_path_buf();
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .returning(move |_, _| {
            block_scratch_removal(&scratch_dir);
            Err(PublishError::Status {
                status: 500,
                body: "InternalError".into(),
            })
        });

    let runner = JobRunner::new(source, publisher, scratch_config(scratch.path()));
    let err = runner.run("ab12").await.unwrap_err();

    assert!(matches!(
        err,
        JobError::Publish(PublishError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn test_same_bundle_gives_same_blob() {
    let mut source = MockRecordSource::new();
    source
        .expect_records_for_prefix()
        .times(2)
        .returning(|_| Ok(scenario_records()));
    let mut publisher = MockPublisher::new();
    publisher.expect_publish().never();

    let runner = JobRunner::new(source, publisher, JobConfig::default());
    let (first, first_stats) = runner.build_blob("ab12").await.unwrap();
    let (second, second_stats) = runner.build_blob("ab12").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first_stats, second_stats);
}

/// Serves empty buckets, recording query order; prefix "00" waits for the gate.
struct GatedSource {
    gate: Arc<Notify>,
    order: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RecordSource for GatedSource {
    async fn records_for_prefix(&self, prefix: &str) -> Result<Vec<BannerRecord>, SourceError> {
        self.order.lock().unwrap().push(prefix.to_string());
        if prefix == "00" {
            self.gate.notified().await;
        }
        if prefix == "dead" {
            return Err("connection reset".into());
        }
        Ok(Vec::new())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_drains_default_lane_first() {
    let gate = Arc::new(Notify::new());
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let source = GatedSource {
        gate: Arc::clone(&gate),
        order: Arc::clone(&order),
    };
    let runner = Arc::new(JobRunner::new(source, test_mode_publisher(), JobConfig::default()));
    let queue = JobQueue::start(runner, QueueConfig { workers: 1 });

    queue.enqueue("00").unwrap();
    while order.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    queue.enqueue("aa").unwrap();
    queue.enqueue("bb").unwrap();
    queue.enqueue_with("cc", Priority::Default).unwrap();
    gate.notify_one();

    let summary = queue.shutdown().await;
    assert!(summary.all_succeeded());
    assert_eq!(*order.lock().unwrap(), vec!["00", "cc", "aa", "bb"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queue_drops_failures_without_retry() {
    let order: Arc<Mutex<Vec<String>>> = Arc::default();
    let source = GatedSource {
        gate: Arc::new(Notify::new()),
        order: Arc::clone(&order),
    };
    let runner = Arc::new(JobRunner::new(source, test_mode_publisher(), JobConfig::default()));
    let queue = JobQueue::start(runner, QueueConfig { workers: 3 });

    for prefix in ["ab", "cd", "dead", "ab"] {
        queue.enqueue(prefix).unwrap();
    }
    let summary = queue.shutdown().await;

    let mut succeeded = summary.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["ab", "ab", "cd"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "dead");

    let dead_attempts = order.lock().unwrap().iter().filter(|p| *p == "dead").count();
    assert_eq!(dead_attempts, 1, "failed jobs must not be retried");
}
