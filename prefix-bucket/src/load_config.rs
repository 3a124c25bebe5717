/// `load_config` module: Loads a static YAML config and injects blob store secrets from the environment.
///
/// This module is the only place where the YAML file and the environment are read.
/// Everything it produces is handed to the core crate as plain values, so no core
/// component ever reaches for process-wide state.
///
/// # Responsibilities
/// - Parse the YAML file into typed sections (records, blob store, job, queue)
/// - Inject `S3_REWARDS_ACCESS_KEY_ID` / `S3_REWARDS_SECRET_ACCESS_KEY`
/// - Require the secrets unless `blob_store.test_mode` is set
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary.
use anyhow::Result;
use prefix_bucket_core::job::JobConfig;
use prefix_bucket_core::publish::BlobStoreConfig;
use prefix_bucket_core::queue::QueueConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ACCESS_KEY_ENV: &str = "S3_REWARDS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "S3_REWARDS_SECRET_ACCESS_KEY";

#[derive(Debug)]
pub struct CliConfig {
    pub records_path: PathBuf,
    pub blob_store: BlobStoreConfig,
    pub job: JobConfig,
    pub queue: QueueConfig,
}

/// Non-secret blob store settings as they appear in YAML.
#[derive(Debug, Deserialize)]
pub struct BlobStoreSection {
    pub region: String,
    pub bucket: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    records_path: PathBuf,
    blob_store: BlobStoreSection,
    #[serde(default)]
    job: JobConfig,
    #[serde(default)]
    queue: QueueConfig,
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let test_mode = raw.blob_store.test_mode;
    let access_key_id = secret_from_env(ACCESS_KEY_ENV, test_mode)?;
    let secret_access_key = secret_from_env(SECRET_KEY_ENV, test_mode)?;

    let blob_store = BlobStoreConfig {
        access_key_id,
        secret_access_key,
        region: raw.blob_store.region,
        bucket: raw.blob_store.bucket,
        endpoint: raw.blob_store.endpoint,
        test_mode,
    };
    blob_store.trace_loaded();

    Ok(CliConfig {
        records_path: raw.records_path,
        blob_store,
        job: raw.job,
        queue: raw.queue,
    })
}

fn secret_from_env(name: &str, test_mode: bool) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => {
            info!(var = name, "Secret found in env");
            Ok(value)
        }
        _ if test_mode => Ok(String::new()),
        Ok(_) | Err(_) => {
            error!(var = name, "Required secret missing from environment");
            Err(anyhow::anyhow!("{name} environment variable not set"))
        }
    }
}
