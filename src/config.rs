// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Configuration file for meshlens
//!
//! All meshlens data is stored under ~/.meshlens/:
//! - ~/.meshlens/config.json - connection settings
//! - ~/.meshlens/log/ - rotated log files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kubernetes::{DEFAULT_BURST, DEFAULT_QPS, RateLimit};

/// Get the base meshlens directory (~/.meshlens/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".meshlens"))
        .context("Could not determine home directory")
}

fn default_qps() -> u32 {
    DEFAULT_QPS
}

fn default_burst() -> u32 {
    DEFAULT_BURST
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    30
}

/// meshlens configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Use the service account of the pod we run in
    #[serde(default)]
    pub in_cluster: bool,

    /// Kubeconfig context; the current context when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Sustained API requests per second (0 disables throttling)
    #[serde(default = "default_qps")]
    pub qps: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            in_cluster: false,
            context: None,
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
        }
    }
}

impl Config {
    /// Load config from disk, or return default if not found.
    ///
    /// The file is edited by hand; meshlens never writes it.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Get the config file path (~/.meshlens/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit::new(self.qps, self.burst)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
