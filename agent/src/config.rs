// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Agent configuration loaded from a TOML file.

use crate::errors::AgentError;
use ipsec::{IpsecServiceDef, IpsecSiteConnection};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Optional statically-configured VPN container.
    pub vpn: Option<VpnConfig>,
}

fn default_name() -> String {
    "agent".to_owned()
}

/// A file-configured VPN service: the helper executable, the interface the
/// traffic leaves through, and the service model itself.
#[derive(Debug, Clone, Deserialize)]
pub struct VpnConfig {
    pub helper: PathBuf,
    pub interface: String,
    pub service: IpsecServiceDef,
    #[serde(default)]
    pub connections: Vec<IpsecSiteConnection>,
}

/// Load the configuration from a TOML file.
///
/// # Errors
///
/// I/O errors reading the file; [`AgentError::Config`] on malformed TOML.
pub fn load(path: &Path) -> Result<AgentConfig, AgentError> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| AgentError::Config(e.to_string()))
}
