//! anim.toml parsing
//!
//! Both sections are optional; a missing file or section means defaults.

use anyhow::{Context, Result};
use nether_anim::{CompressionSettings, CompressionStrategy};
use serde::Deserialize;
use std::path::Path;

/// anim.toml structure
#[derive(Debug, Default, Deserialize)]
pub struct AnimConfig {
    #[serde(default)]
    pub compression: CompressionSettings,

    /// Strategy applied to every input.
    /// Default: automatic selection
    #[serde(default)]
    pub strategy: CompressionStrategy,
}

impl AnimConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse config from string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse anim.toml")
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.compression.alternative_compression_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            anyhow::bail!(
                "alternative_compression_threshold must be a non-negative number, got {threshold}"
            );
        }
        if let CompressionStrategy::PerTrack(params) = &self.strategy {
            params.encoding.validate().context("Invalid [strategy.encoding]")?;
        }
        Ok(())
    }
}
