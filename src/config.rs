//! Command-line and environment configuration shared by the binaries

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use crate::census_api::RetryPolicy;

/// Where the static input tables live
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory holding the input CSV files
    #[arg(long, env = "DISTRICT_RANK_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// District measurements CSV (relative to the data dir unless absolute)
    #[arg(long, default_value = "census_data.csv", global = true)]
    pub measurements: PathBuf,

    /// Variable definitions CSV
    #[arg(long, default_value = "Variables.csv", global = true)]
    pub variables: PathBuf,

    /// ZIP to congressional district CSV
    #[arg(long, default_value = "zip_to_congressional_district.csv", global = true)]
    pub zip_map: PathBuf,

    /// Congress number used in descriptive district names
    #[arg(long, env = "DISTRICT_RANK_CONGRESS", default_value = "115", global = true)]
    pub congress: u16,
}

impl DataArgs {
    fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.data_dir.join(file)
        }
    }

    pub fn measurements_path(&self) -> PathBuf {
        self.resolve(&self.measurements)
    }

    pub fn variables_path(&self) -> PathBuf {
        self.resolve(&self.variables)
    }

    pub fn zip_map_path(&self) -> PathBuf {
        self.resolve(&self.zip_map)
    }
}

/// Retry and timeout settings for outbound HTTP calls
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Attempts per request before giving up
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "10")]
    pub timeout_secs: u64,

    /// First backoff delay in milliseconds, doubled on each retry
    #[arg(long, default_value = "1000")]
    pub backoff_ms: u64,
}

impl RemoteArgs {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries.max(1),
            base_delay: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` filter
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
