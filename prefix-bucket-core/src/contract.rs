//! # contract: collaborator interfaces for the prefix bucket job
//!
//! This module defines the two seams the job talks through and the plain data
//! that crosses them:
//!
//! - [`RecordSource`]: yields every [`BannerRecord`] whose digest starts with a prefix.
//! - [`Publisher`]: stores a finished blob under the prefix-derived key.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; the mocks are exported behind the
//!   default `test-export-mocks` feature so integration tests can drive the job
//!   without a database or a blob store.
//!
//! ## Error Types
//! - Record sources are external collaborators and return boxed errors.
//! - Publishers return [`PublishError`], which the job treats as fatal.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::publish::PublishError;

/// Status of the payout wallet linked to a channel.
///
/// The integer values are part of the published schema and must never be reused.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration, Serialize, Deserialize,
)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum WalletConnectedState {
    NoVerification = 0,
    UpholdAccountNoKyc = 1,
    UpholdAccountKyc = 2,
    BitflyerVerified = 3,
    GeminiVerified = 4,
}

/// One row of banner lookup data, as handed over by the record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BannerRecord {
    /// Hex SHA-256 of the channel identifier; buckets are keyed by its prefix.
    pub sha2_base16: String,
    pub channel_identifier: String,
    pub wallet_status: WalletConnectedState,
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Externally defined banner attributes. Key order is preserved.
    #[serde(default)]
    pub derived_site_banner_info: Map<String, Value>,
}

/// Error type for record sources (simple boxed error, like other collaborators).
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for querying banner lookup records by digest prefix.
///
/// Implementations must return records in a stable order; the bucket preserves it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every record whose `sha2_base16` starts with `prefix`.
    async fn records_for_prefix(&self, prefix: &str) -> Result<Vec<BannerRecord>, SourceError>;
}

/// What a publish call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The blob was stored under `key`; `etag` is whatever the store returned.
    Uploaded { key: String, etag: Option<String> },
    /// Test mode: nothing left the process.
    Skipped { key: String },
}

impl PublishOutcome {
    pub fn key(&self) -> &str {
        match self {
            PublishOutcome::Uploaded { key, .. } | PublishOutcome::Skipped { key } => key,
        }
    }
}

/// Trait for storing a finished bucket blob.
///
/// Writes are last-write-wins: a later publish for the same prefix replaces the
/// earlier blob without versioning.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store `blob` under the key derived from `prefix`.
    async fn publish(&self, prefix: &str, blob: Vec<u8>) -> Result<PublishOutcome, PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_deserializes_integer_wallet_status() {
        let record: BannerRecord = serde_json::from_str(
            r#"{
                "sha2_base16": "ab12ff",
                "channel_identifier": "example.com",
                "wallet_status": 2,
                "derived_site_banner_info": {"title": "Hi", "logoUrl": "https://x/logo.png"}
            }"#,
        )
        .unwrap();

        assert_eq!(record.wallet_status, WalletConnectedState::UpholdAccountKyc);
        assert_eq!(record.wallet_address, None);
        let keys: Vec<&String> = record.derived_site_banner_info.keys().collect();
        assert_eq!(keys, vec!["title", "logoUrl"]);
    }

    #[test]
    fn record_rejects_unknown_wallet_status() {
        let res: Result<BannerRecord, _> = serde_json::from_str(
            r#"{"sha2_base16": "ab", "channel_identifier": "c", "wallet_status": 99}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn outcome_exposes_key() {
        let outcome = PublishOutcome::Skipped {
            key: "publishers/prefixes/ab12".into(),
        };
        assert_eq!(outcome.key(), "publishers/prefixes/ab12");
    }
}
