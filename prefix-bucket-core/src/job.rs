//! High-level pipeline: builds and publishes the bucket for one prefix.
//!
//! One [`JobRunner::run`] call performs, strictly in order:
//!   - query the [`RecordSource`] for every record under the prefix
//!   - map records to entries ([`EntryBuilder`])
//!   - encode, compress, frame and pad the payload
//!   - write the blob to a [`ScratchFile`]
//!   - hand the blob to the [`Publisher`]
//!   - remove the scratch file, whatever the publish result was
//!
//! # Error Handling
//! Any failure before or during publishing aborts the run with a [`JobError`];
//! no blob is published for that run and nothing is retried. A failed cleanup
//! is logged as a warning and does not change the result.
//!
//! Runs share no mutable state, so any number may execute concurrently.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::codec::{self, BrotliCompressor, CodecError};
use crate::contract::{PublishOutcome, Publisher, RecordSource, SourceError};
use crate::entry::EntryBuilder;
use crate::framing::{self, FrameError};
use crate::publish::PublishError;
use crate::schema::SCHEMA_VERSION;
use crate::scratch::{CleanupOutcome, ScratchFile};

/// Settings for individual runs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobConfig {
    /// Required prefix length, if buckets use a fixed one.
    #[serde(default)]
    pub prefix_length: Option<usize>,
    /// Where scratch files go; the system temp dir when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid prefix {prefix:?}: {reason}")]
    InvalidPrefix { prefix: String, reason: String },
    #[error("record query failed: {0}")]
    Query(#[source] SourceError),
    #[error("payload compression failed: {0}")]
    Compress(#[from] CodecError),
    #[error("payload framing failed: {0}")]
    Frame(#[from] FrameError),
    #[error("scratch file error: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// Summary of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub prefix: String,
    pub key: String,
    pub entries: usize,
    pub payload_len: usize,
    pub compressed_len: usize,
    pub blob_len: usize,
    pub outcome: PublishOutcome,
}

/// Runs the bucket pipeline against a record source and a publisher.
pub struct JobRunner<S, P> {
    source: S,
    publisher: P,
    builder: EntryBuilder,
    compressor: BrotliCompressor,
    config: JobConfig,
}

impl<S, P> JobRunner<S, P>
where
    S: RecordSource,
    P: Publisher,
{
    pub fn new(source: S, publisher: P, config: JobConfig) -> Self {
        Self {
            source,
            publisher,
            builder: EntryBuilder::new(),
            compressor: BrotliCompressor::default(),
            config,
        }
    }

    /// Check that `prefix` is non-empty hex of the configured length.
    pub fn validate_prefix(&self, prefix: &str) -> Result<(), JobError> {
        let invalid = |reason: String| JobError::InvalidPrefix {
            prefix: prefix.to_string(),
            reason,
        };
        if prefix.is_empty() {
            return Err(invalid("prefix is empty".into()));
        }
        if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("prefix must be hexadecimal".into()));
        }
        match self.config.prefix_length {
            Some(expected) if prefix.len() != expected => Err(invalid(format!(
                "expected {expected} characters, got {}",
                prefix.len()
            ))),
            _ => Ok(()),
        }
    }

    /// Build the padded blob for `prefix` without publishing it.
    pub async fn build_blob(&self, prefix: &str) -> Result<(Vec<u8>, BlobStats), JobError> {
        self.validate_prefix(prefix)?;

        let records = self.source.records_for_prefix(prefix).await.map_err(|e| {
            error!(prefix, error = %e, "[JOB][ERROR] Record query failed");
            JobError::Query(e)
        })?;
        debug!(prefix, records = records.len(), "[JOB] Records fetched");

        let bundle = self.builder.build(&records);
        let payload = codec::encode(&bundle);
        let compressed = self.compressor.compress(&payload)?;
        let framed = framing::frame(&compressed)?;
        let blob = framing::pad(framed);

        let stats = BlobStats {
            entries: bundle.len(),
            payload_len: payload.len(),
            compressed_len: compressed.len(),
        };
        Ok((blob, stats))
    }

    pub async fn run(&self, prefix: &str) -> Result<JobReport, JobError> {
        info!(
            prefix,
            schema_version = SCHEMA_VERSION,
            key_table_version = self.builder.key_table().version(),
            "[JOB] Starting bucket build"
        );

        let (blob, stats) = self.build_blob(prefix).await?;
        let blob_len = blob.len();

        let mut scratch = ScratchFile::create(self.config.scratch_dir.as_deref()).map_err(|e| {
            error!(prefix, error = %e, "[JOB][ERROR] Could not create scratch file");
            JobError::Scratch(e)
        })?;

        let published = self.publish_from_scratch(prefix, &scratch, &blob).await;

        match scratch.cleanup() {
            CleanupOutcome::Deleted => debug!(prefix, "[JOB] Scratch file removed"),
            CleanupOutcome::AlreadyAbsent => debug!(prefix, "[JOB] Scratch file already gone"),
            CleanupOutcome::Failed(e) => warn!(
                prefix,
                path = %scratch.path().display(),
                error = %e,
                "[JOB] Could not remove scratch file"
            ),
        }

        let outcome = published?;
        let report = JobReport {
            prefix: prefix.to_string(),
            key: outcome.key().to_string(),
            entries: stats.entries,
            payload_len: stats.payload_len,
            compressed_len: stats.compressed_len,
            blob_len,
            outcome,
        };
        info!(
            prefix,
            key = %report.key,
            entries = report.entries,
            blob_len = report.blob_len,
            "[JOB] Bucket published"
        );
        Ok(report)
    }

    async fn publish_from_scratch(
        &self,
        prefix: &str,
        scratch: &ScratchFile,
        blob: &[u8],
    ) -> Result<PublishOutcome, JobError> {
        scratch.write_blob(blob).map_err(JobError::Scratch)?;
        let staged = scratch.read_blob().map_err(JobError::Scratch)?;
        self.publisher.publish(prefix, staged).await.map_err(|e| {
            error!(prefix, error = %e, "[JOB][ERROR] Publish failed");
            JobError::Publish(e)
        })
    }
}

/// Sizes recorded while building a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobStats {
    pub entries: usize,
    pub payload_len: usize,
    pub compressed_len: usize,
}
