/// # prefix-bucket CLI Interface (Module)
///
/// Command parsing and orchestration for the `prefix-bucket` binary. All bucket
/// logic (entry mapping, encoding, publishing, the worker pool) lives in
/// [`prefix-bucket-core`]; this module only wires config into it and prints results.
///
/// ## Commands
/// - `build`: run one bucket job in the foreground and print its report.
/// - `enqueue`: feed many prefixes through the worker pool and print the summary.
///   Exits non-zero if any job failed.
/// - `inspect`: decode a published blob from disk and print it as JSON.
///
/// [`prefix-bucket-core`]: ../../prefix-bucket-core/
use crate::load_config::{load_config, CliConfig};
use crate::source::JsonFileRecordSource;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use prefix_bucket_core::job::JobRunner;
use prefix_bucket_core::publish::S3Publisher;
use prefix_bucket_core::queue::{JobQueue, Priority};
use prefix_bucket_core::read_blob;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for prefix-bucket: build and publish channel lookup buckets.
#[derive(Parser)]
#[clap(
    name = "prefix-bucket",
    version,
    about = "Build, publish and inspect privacy-padded channel lookup buckets"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and publish the bucket for a single prefix
    Build {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Lowercase hex digest prefix
        #[clap(long)]
        prefix: String,
    },
    /// Run bucket jobs for several prefixes on the worker pool
    Enqueue {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Prefixes to rebuild; may be repeated
        #[clap(long = "prefix", required = true)]
        prefixes: Vec<String>,
        #[clap(long, value_enum, default_value_t = PriorityArg::Low)]
        priority: PriorityArg,
    },
    /// Decode a published blob and print its entries as JSON
    Inspect {
        /// Path to a blob file as stored under publishers/prefixes/
        #[clap(long)]
        blob: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PriorityArg {
    Default,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Default => Priority::Default,
            PriorityArg::Low => Priority::Low,
        }
    }
}

fn runner_from(config: CliConfig) -> JobRunner<JsonFileRecordSource, S3Publisher> {
    let source = JsonFileRecordSource::new(config.records_path);
    let publisher = S3Publisher::new(config.blob_store);
    JobRunner::new(source, publisher, config.job)
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Build { config, prefix } => {
            let config = load_config(config)?;
            tracing::info!(command = "build", prefix = %prefix, "Starting bucket job");
            let runner = runner_from(config);
            match runner.run(&prefix).await {
                Ok(report) => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "build", prefix = %prefix, error = %e, "Bucket job failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Enqueue {
            config,
            prefixes,
            priority,
        } => {
            let config = load_config(config)?;
            let queue_config = config.queue.clone();
            tracing::info!(
                command = "enqueue",
                jobs = prefixes.len(),
                workers = queue_config.workers,
                "Starting worker pool"
            );
            let queue = JobQueue::start(Arc::new(runner_from(config)), queue_config);
            for prefix in prefixes {
                queue.enqueue_with(prefix, priority.into())?;
            }
            let summary = queue.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.all_succeeded() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "{} of {} bucket jobs failed",
                    summary.failed.len(),
                    summary.failed.len() + summary.succeeded.len()
                ))
            }
        }
        Commands::Inspect { blob } => {
            let bytes = std::fs::read(&blob)
                .map_err(|e| anyhow::anyhow!("Failed to read blob {:?}: {}", blob, e))?;
            let bundle = read_blob(&bytes)?;
            tracing::info!(command = "inspect", entries = bundle.len(), "Decoded blob");
            println!("{}", serde_json::to_string_pretty(&bundle)?);
            Ok(())
        }
    }
}
