//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section and field has a default, so a missing or partial file
//! still yields the standard economy (1000 pts start, 150/800 caps,
//! 60 minute cooldown, America/New_York).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::clock::{ReferenceZone, DEFAULT_TIMEZONE};
use crate::types::Points;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub economy: EconomyConfig,
    pub clock: ClockConfig,
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EconomyConfig {
    pub start_balance: Points,
    pub daily_stake_cap: Points,
    pub weekly_stake_cap: Points,
    pub cooldown_minutes: i64,
    pub max_legs: usize,
    pub max_leg_chars: usize,
    /// Oldest ledger entries beyond this count are dropped.
    pub ledger_retention: usize,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            start_balance: 1000,
            daily_stake_cap: 150,
            weekly_stake_cap: 800,
            cooldown_minutes: 60,
            max_legs: 5,
            max_leg_chars: 100,
            ledger_retention: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClockConfig {
    /// IANA zone name used for deadlines and cap windows.
    pub timezone: String,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl ClockConfig {
    pub fn zone(&self) -> Result<ReferenceZone> {
        ReferenceZone::from_name(&self.timezone)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "selfparlay_data.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// How long a picked leg waits for its Complete/Fail choice.
    pub selection_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            selection_timeout_secs: 60,
        }
    }
}

impl GatewayConfig {
    /// Selection timeout, capped at a year.
    pub fn selection_timeout(&self) -> chrono::Duration {
        let cap = chrono::Duration::days(365);
        i64::try_from(self.selection_timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .map_or(cap, |d| d.min(cap))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            warn!(path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
