use crate::expansion::ExpansionLimits;
use crate::fetch::{FetcherConfig, RetryConfig};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8000";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_CACHE_CAPACITY: usize = 256;
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_MAX_IMPORT_ROUNDS: u32 = 32;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_bind_address: SocketAddr,
    pub fetch_timeout_secs: u64,
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay_ms: u64,
    /// Zero disables the graph cache
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub max_import_rounds: u32,
    /// Zero disables the request deadline
    pub request_timeout_secs: u64,
    pub graceful_shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            fetch_max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            fetch_retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_import_rounds: DEFAULT_MAX_IMPORT_ROUNDS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            graceful_shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            http_bind: cli_http_bind,
            fetch_timeout_secs: cli_fetch_timeout,
            fetch_max_attempts: cli_fetch_attempts,
            fetch_retry_delay_ms: cli_retry_delay,
            cache_capacity: cli_cache_capacity,
            cache_ttl_secs: cli_cache_ttl,
            max_import_rounds: cli_import_rounds,
            request_timeout_secs: cli_request_timeout,
            graceful_shutdown_timeout_secs: cli_shutdown_timeout,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            http_bind: file_http_bind,
            fetch_timeout_secs: file_fetch_timeout,
            fetch_max_attempts: file_fetch_attempts,
            fetch_retry_delay_ms: file_retry_delay,
            cache_capacity: file_cache_capacity,
            cache_ttl_secs: file_cache_ttl,
            max_import_rounds: file_import_rounds,
            request_timeout_secs: file_request_timeout,
            graceful_shutdown_timeout_secs: file_shutdown_timeout,
        } = file_config;

        let http_bind_address = match cli_http_bind.or(file_http_bind) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_BIND
                .parse()
                .context("default bind address is invalid")?,
        };

        Ok(Self {
            http_bind_address,
            fetch_timeout_secs: cli_fetch_timeout
                .or(file_fetch_timeout)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            fetch_max_attempts: cli_fetch_attempts
                .or(file_fetch_attempts)
                .unwrap_or(DEFAULT_FETCH_MAX_ATTEMPTS),
            fetch_retry_delay_ms: cli_retry_delay
                .or(file_retry_delay)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            cache_capacity: cli_cache_capacity
                .or(file_cache_capacity)
                .unwrap_or(DEFAULT_CACHE_CAPACITY),
            cache_ttl_secs: cli_cache_ttl
                .or(file_cache_ttl)
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
            max_import_rounds: cli_import_rounds
                .or(file_import_rounds)
                .unwrap_or(DEFAULT_MAX_IMPORT_ROUNDS),
            request_timeout_secs: cli_request_timeout
                .or(file_request_timeout)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            graceful_shutdown_timeout_secs: cli_shutdown_timeout
                .or(file_shutdown_timeout)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
        })
    }

    /// Rejects settings that would make every fetch or import fail.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.fetch_max_attempts > 0,
            "fetch_max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.fetch_timeout_secs > 0,
            "fetch_timeout_secs must be greater than 0"
        );
        anyhow::ensure!(
            self.max_import_rounds > 0,
            "max_import_rounds must be at least 1"
        );
        if self.cache_capacity > 0 {
            anyhow::ensure!(
                self.cache_ttl_secs > 0,
                "cache_ttl_secs must be greater than 0 when the cache is enabled"
            );
        }
        Ok(())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            retry: RetryConfig {
                max_attempts: self.fetch_max_attempts,
                delay: Duration::from_millis(self.fetch_retry_delay_ms),
            },
            ..FetcherConfig::default()
        }
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_capacity > 0
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn expansion_limits(&self) -> ExpansionLimits {
        ExpansionLimits {
            max_import_rounds: self.max_import_rounds,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_timeout_secs)
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "shacl-validator",
    about = "SHACL validation service with owl:imports and remote object expansion",
    version
)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML, JSON or TOML)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "SHACL_VALIDATOR_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long = "fetch-timeout",
        env = "SHACL_VALIDATOR_FETCH_TIMEOUT",
        value_name = "SECS",
        help = "Timeout for a single remote graph request"
    )]
    pub fetch_timeout_secs: Option<u64>,

    #[arg(
        long = "fetch-attempts",
        env = "SHACL_VALIDATOR_FETCH_ATTEMPTS",
        value_name = "N",
        help = "Attempts per remote graph before giving up on transient errors"
    )]
    pub fetch_max_attempts: Option<u32>,

    #[arg(
        long = "retry-delay-ms",
        env = "SHACL_VALIDATOR_RETRY_DELAY_MS",
        value_name = "MS",
        help = "Fixed delay between fetch attempts"
    )]
    pub fetch_retry_delay_ms: Option<u64>,

    #[arg(
        long,
        env = "SHACL_VALIDATOR_CACHE_CAPACITY",
        value_name = "N",
        help = "Remote graphs kept in the cache (0 disables it)",
        value_parser = clap::value_parser!(usize)
    )]
    pub cache_capacity: Option<usize>,

    #[arg(
        long = "cache-ttl",
        env = "SHACL_VALIDATOR_CACHE_TTL",
        value_name = "SECS",
        help = "Lifetime of a cached remote graph"
    )]
    pub cache_ttl_secs: Option<u64>,

    #[arg(
        long,
        env = "SHACL_VALIDATOR_MAX_IMPORT_ROUNDS",
        value_name = "N",
        help = "Upper bound on owl:imports resolution rounds"
    )]
    pub max_import_rounds: Option<u32>,

    #[arg(
        long = "request-timeout",
        env = "SHACL_VALIDATOR_REQUEST_TIMEOUT",
        value_name = "SECS",
        help = "Deadline for a whole validation request (0 disables it)"
    )]
    pub request_timeout_secs: Option<u64>,

    #[arg(
        long = "shutdown-timeout",
        env = "SHACL_VALIDATOR_SHUTDOWN_TIMEOUT",
        value_name = "SECS",
        help = "Time allowed for in-flight requests on shutdown"
    )]
    pub graceful_shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    http_bind: Option<SocketAddr>,
    fetch_timeout_secs: Option<u64>,
    fetch_max_attempts: Option<u32>,
    fetch_retry_delay_ms: Option<u64>,
    cache_capacity: Option<usize>,
    cache_ttl_secs: Option<u64>,
    max_import_rounds: Option<u32>,
    request_timeout_secs: Option<u64>,
    graceful_shutdown_timeout_secs: Option<u64>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        "toml" => toml::from_str(&contents)
            .with_context(|| format!("failed to parse TOML config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
