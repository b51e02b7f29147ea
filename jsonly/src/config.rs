//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `JSONLY_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `JSONLY_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `JSONLY_BACKEND__URL=http://backend:9000` sets the `backend.url` field.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Point at a different backend
//! JSONLY_BACKEND__URL="https://analysis.example.com/api"
//!
//! # Raise the per-request timeout
//! JSONLY_BACKEND__TIMEOUT="2m"
//!
//! # Supply the bearer token outside the config file
//! JSONLY_BACKEND__TOKEN="eyJhbGciOi..."
//! ```

use clap::{Parser, Subcommand};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - config file selection plus one operation subcommand
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "JSONLY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without running a command.
    /// Useful for CI/CD pipelines to catch config errors before deployment.
    #[arg(long)]
    pub validate: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Operations the binary runs against the analysis backend.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a document and print the extraction
    Extract {
        /// Path to the PDF or CSV file
        path: PathBuf,
        /// Shape the extraction with a saved template
        #[arg(long)]
        template_id: Option<String>,
        /// Submit an async task and print its id instead of waiting
        #[arg(long)]
        detach: bool,
    },
    /// Whether an async extraction task has finished
    Status {
        task_id: String,
    },
    /// Fetch the extraction a finished async task produced
    Result {
        task_id: String,
    },
    /// Merge a JSON array of template summaries read from a file
    Harmonize {
        path: PathBuf,
    },
    /// Provision client credentials with the configured bearer token
    RegisterClient,
    /// Rotate the client secret for the configured user id
    RegenerateSecret,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Analysis backend connection settings
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
        }
    }
}

/// Analysis backend connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the analysis backend
    pub url: Url,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Bearer token for endpoints that require authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// User id sent to uid-scoped endpoints (secret rotation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_uid: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("http://localhost:8000").unwrap(),
            timeout: Duration::from_secs(30),
            token: None,
            user_uid: None,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("JSONLY_").split("__"))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        match self.backend.url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::BadRequest {
                    message: format!("Config validation: backend.url must use http or https, got '{other}'"),
                });
            }
        }

        if self.backend.timeout.is_zero() {
            return Err(Error::BadRequest {
                message: "Config validation: backend.timeout must be positive".to_string(),
            });
        }

        if let Some(token) = &self.backend.token {
            if token.is_empty() {
                return Err(Error::BadRequest {
                    message: "Config validation: backend.token may not be empty when set. \
                     Omit the field or set JSONLY_BACKEND__TOKEN."
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}
