//! # publish: store finished buckets in S3
//!
//! [`S3Publisher`] implements [`Publisher`] with a single AWS Signature V4
//! signed `PUT` per blob. Everything it needs (credentials, region, bucket,
//! optional endpoint, test mode) comes in through [`BlobStoreConfig`] at
//! construction; nothing is read from the environment here.
//!
//! In test mode the publisher returns [`PublishOutcome::Skipped`] without
//! touching the network.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::contract::{PublishOutcome, Publisher};

/// Key namespace for published buckets.
pub const KEY_PREFIX: &str = "publishers/prefixes/";

const SERVICE: &str = "s3";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

type HmacSha256 = Hmac<Sha256>;

/// Store key for the bucket of `prefix`. No extension.
pub fn blob_key(prefix: &str) -> String {
    format!("{KEY_PREFIX}{prefix}")
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid blob store endpoint {endpoint:?}: {reason}")]
    Endpoint { endpoint: String, reason: String },
    #[error("could not compute request signature")]
    Signing,
    #[error("upload request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("blob store rejected upload with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Blob store settings, injected by whoever builds the publisher.
#[derive(Clone, Default, Deserialize)]
pub struct BlobStoreConfig {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    /// S3-compatible endpoint (path-style). Defaults to AWS virtual-host style.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Skip the upload entirely.
    #[serde(default)]
    pub test_mode: bool,
}

impl fmt::Debug for BlobStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobStoreConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("test_mode", &self.test_mode)
            .finish()
    }
}

impl BlobStoreConfig {
    pub fn trace_loaded(&self) {
        info!(
            region = %self.region,
            bucket = %self.bucket,
            endpoint = self.endpoint.as_deref().unwrap_or("aws"),
            test_mode = self.test_mode,
            "Loaded blob store config"
        );
    }

    /// Host header value and full URL for `key`.
    fn object_url(&self, key: &str) -> Result<(String, String), PublishError> {
        let path = uri_encode_path(key);
        match &self.endpoint {
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", self.bucket, self.region);
                let url = format!("https://{host}/{path}");
                Ok((host, url))
            }
            Some(endpoint) => {
                let invalid = |reason: &str| PublishError::Endpoint {
                    endpoint: endpoint.clone(),
                    reason: reason.into(),
                };
                let parsed = reqwest::Url::parse(endpoint)
                    .map_err(|_| invalid("expected scheme://host[:port]"))?;
                let host_name = parsed
                    .host_str()
                    .ok_or_else(|| invalid("expected scheme://host[:port]"))?;
                if parsed.path() != "/" || parsed.query().is_some() {
                    return Err(invalid("endpoint must not carry a path or query"));
                }
                // Url::port() is None for the scheme's default port, matching the Host header sent.
                let host = match parsed.port() {
                    Some(port) => format!("{host_name}:{port}"),
                    None => host_name.to_string(),
                };
                let url = format!("{}://{host}/{}/{path}", parsed.scheme(), self.bucket);
                Ok((host, url))
            }
        }
    }

    /// Canonical URI path component for `key`, as signed.
    fn canonical_uri(&self, key: &str) -> String {
        match &self.endpoint {
            None => format!("/{}", uri_encode_path(key)),
            Some(_) => format!("/{}/{}", self.bucket, uri_encode_path(key)),
        }
    }
}

/// Uploads bucket blobs to S3 or an S3-compatible store.
pub struct S3Publisher {
    config: BlobStoreConfig,
    client: reqwest::Client,
}

impl S3Publisher {
    pub fn new(config: BlobStoreConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn sign_put(
        &self,
        host: &str,
        key: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, PublishError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let canonical_request = format!(
            "PUT\n{uri}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
            uri = self.config.canonical_uri(key),
        );
        let scope = format!("{date}/{}/{SERVICE}/aws4_request", self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let key_bytes = signing_key(&self.config.secret_access_key, &date, &self.config.region, SERVICE)?;
        let signature = hex::encode(hmac_sha256(&key_bytes, string_to_sign.as_bytes())?);
        Ok(SignedHeaders {
            amz_date,
            authorization: format!(
                "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
                self.config.access_key_id
            ),
        })
    }
}

struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn publish(&self, prefix: &str, blob: Vec<u8>) -> Result<PublishOutcome, PublishError> {
        let key = blob_key(prefix);
        if self.config.test_mode {
            debug!(key = %key, size = blob.len(), "[PUBLISH] Test mode, skipping upload");
            return Ok(PublishOutcome::Skipped { key });
        }

        let (host, url) = self.config.object_url(&key)?;
        let payload_hash = hex::encode(Sha256::digest(&blob));
        let signed = self.sign_put(&host, &key, &payload_hash, Utc::now())?;
        let size = blob.len();

        info!(key = %key, bucket = %self.config.bucket, size, "[PUBLISH] Uploading bucket blob");
        let response = self
            .client
            .put(&url)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .header(reqwest::header::AUTHORIZATION, &signed.authorization)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(blob)
            .send()
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "[PUBLISH][ERROR] Upload request failed");
                PublishError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(key = %key, status = status.as_u16(), "[PUBLISH][ERROR] Blob store rejected upload");
            return Err(PublishError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        info!(key = %key, etag = etag.as_deref().unwrap_or(""), "[PUBLISH] Upload complete");
        Ok(PublishOutcome::Uploaded { key, etag })
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, PublishError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| PublishError::Signing)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// SigV4 signing key for one day, region and service.
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> Result<Vec<u8>, PublishError> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode every path segment, keeping `/` separators.
fn uri_encode_path(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
