//! Configuration file handling for canlink

use anyhow::{Context, Result};
use canlink_session::CanlinkConfig;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
///
/// CLI-only keys sit next to the session settings in one TOML document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default interface name (manual mode)
    pub interface: Option<String>,
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    #[serde(flatten)]
    pub session: CanlinkConfig,
}

impl Config {
    /// Load configuration from the default config file, if there is one
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("canlink");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        self,
        interface: Option<&str>,
        project: Option<&str>,
        output: Option<OutputFormat>,
        no_color: bool,
    ) -> Result<MergedConfig> {
        let output = match (output, &self.output) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("Invalid output format in config: {}", e))?,
            (None, None) => OutputFormat::default(),
        };

        let mut session = self.session;
        if let Some(project) = project {
            session.project = project.to_string();
        }

        Ok(MergedConfig {
            interface: interface.map(String::from).or(self.interface),
            output,
            no_color: no_color || self.no_color.unwrap_or(false),
            session,
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub interface: Option<String>,
    pub output: OutputFormat,
    pub no_color: bool,
    pub session: CanlinkConfig,
}
