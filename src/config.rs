//! Configuration module for the agency client.
//!
//! Supports command-line arguments, environment variables and a TOML
//! configuration file. CLI arguments and environment variables take
//! precedence over config file values.

use crate::bets::BetSource;
use crate::error::ConfigError;
use crate::protocol::{frame_overhead, AgencyId, LENGTH_PREFIX_BYTES, MAX_FRAME_PAYLOAD};
use crate::submitter::BatchLimits;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the agency client
#[derive(Parser, Debug, Default)]
#[command(name = "agency-client")]
#[command(author = "agency-client authors")]
#[command(version = "0.1.0")]
#[command(about = "Submits lottery bets to the central aggregator", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CLI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Agency identifier (0-65535)
    #[arg(short, long, env = "CLI_ID")]
    pub id: Option<String>,

    /// Aggregator address (e.g., server:12345)
    #[arg(short, long, env = "CLI_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Chunk budget in bytes, frame header included
    #[arg(long, env = "CLI_BATCH_MAX_BYTES")]
    pub max_chunk_bytes: Option<usize>,

    /// Largest single read or write on the connection
    #[arg(long, env = "CLI_MAX_SEGMENT_BYTES")]
    pub max_segment_bytes: Option<usize>,

    /// CSV file with the agency's bets (defaults to a single bet from the environment)
    #[arg(short, long, env = "CLI_BETS_FILE")]
    pub bets_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CLI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Agency identity and aggregator location
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    pub id: Option<String>,
    #[serde(default = "default_server_address")]
    pub server_address: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            id: None,
            server_address: default_server_address(),
        }
    }
}

/// Chunking and bet source
#[derive(Debug, Deserialize)]
pub struct BatchSection {
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    #[serde(default = "default_max_segment_bytes")]
    pub max_segment_bytes: usize,
    pub bets_file: Option<PathBuf>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            max_chunk_bytes: default_max_chunk_bytes(),
            max_segment_bytes: default_max_segment_bytes(),
            bets_file: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_server_address() -> String {
    "server:12345".to_string()
}

fn default_max_chunk_bytes() -> usize {
    8 * 1024
}

fn default_max_segment_bytes() -> usize {
    8 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub agency: AgencyId,
    pub server_address: String,
    pub max_chunk_bytes: usize,
    pub max_segment_bytes: usize,
    pub bets: BetSource,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents =
                std::fs::read_to_string(config_path).map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
                path: config_path.clone(),
                source,
            })?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence) and validate.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let agency = cli
            .id
            .or(toml_config.client.id)
            .ok_or(ConfigError::MissingAgencyId)?
            .parse()?;

        let bets = match cli.bets_file.or(toml_config.batch.bets_file) {
            Some(path) => BetSource::File(path),
            None => BetSource::Environment,
        };

        let config = Config {
            agency,
            server_address: cli
                .server_address
                .unwrap_or(toml_config.client.server_address),
            max_chunk_bytes: cli
                .max_chunk_bytes
                .unwrap_or(toml_config.batch.max_chunk_bytes),
            max_segment_bytes: cli
                .max_segment_bytes
                .unwrap_or(toml_config.batch.max_segment_bytes),
            bets,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject limits the wire format cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Room for the envelope plus a one-byte record, strictly below budget
        let min = frame_overhead(self.agency.as_str().len()) + 2;
        if self.max_chunk_bytes < min {
            return Err(ConfigError::ChunkBudgetTooSmall {
                budget: self.max_chunk_bytes,
                min,
            });
        }

        let max = LENGTH_PREFIX_BYTES + MAX_FRAME_PAYLOAD;
        if self.max_chunk_bytes > max {
            return Err(ConfigError::ChunkBudgetTooLarge {
                budget: self.max_chunk_bytes,
                max,
            });
        }

        if self.max_segment_bytes == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.max_segment_bytes > max {
            return Err(ConfigError::SegmentSizeTooLarge {
                size: self.max_segment_bytes,
                max,
            });
        }

        Ok(())
    }

    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_chunk_bytes: self.max_chunk_bytes,
            max_segment_bytes: self.max_segment_bytes,
        }
    }
}
