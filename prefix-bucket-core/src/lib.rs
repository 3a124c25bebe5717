#![doc = "prefix-bucket-core: builds and publishes privacy-padded channel lookup buckets."]

//! Clients look channels up by fetching a whole bucket: every channel whose
//! identifier digest shares a hex prefix. This crate builds those buckets
//! (entry mapping, protobuf encoding, Brotli compression, length framing and
//! size padding), publishes them to a blob store, and runs the builds on a
//! worker pool.
//!
//! # Usage
//! Construct a [`job::JobRunner`] from a [`contract::RecordSource`] and a
//! [`contract::Publisher`], then call `run(prefix)` directly or feed prefixes
//! through a [`queue::JobQueue`].

pub mod codec;
pub mod contract;
pub mod entry;
pub mod framing;
pub mod job;
pub mod publish;
pub mod queue;
pub mod schema;
pub mod scratch;

pub use codec::{decode, encode, BrotliCompressor, CodecError};
pub use contract::{BannerRecord, PublishOutcome, Publisher, RecordSource, WalletConnectedState};
pub use entry::{BannerDetails, ChannelEntry, EntryBuilder, ResponseBundle};
pub use framing::{frame, pad, unframe};
pub use job::{JobConfig, JobError, JobReport, JobRunner};
pub use publish::{blob_key, BlobStoreConfig, S3Publisher};
pub use queue::{JobQueue, Priority, QueueConfig, QueueSummary};

/// Reverse the published wire format: strip padding, decompress, decode.
pub fn read_blob(blob: &[u8]) -> Result<ResponseBundle, BlobReadError> {
    let compressed = framing::strip_padding(blob)?;
    let payload = BrotliCompressor::default().decompress(compressed)?;
    Ok(codec::decode(&payload)?)
}

#[derive(Debug, thiserror::Error)]
pub enum BlobReadError {
    #[error(transparent)]
    Frame(#[from] framing::FrameError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
