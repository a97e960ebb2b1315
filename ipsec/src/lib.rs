// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPsec site-to-site VPN container lifecycle: renders the service
//! configuration and drives the external vpn-helper program through an
//! idempotent setup / ordered teardown sequence.

#![deny(clippy::all)]
#![allow(clippy::similar_names)]

pub mod config;
pub mod container;
mod errors;
pub mod helper;

// re-exports
pub use config::{
    sanitize_name, DpdAction, EncapsulationMode, IkePolicy, IkeVersion, Initiator, IpsecConfig,
    IpsecPolicy, IpsecServiceDef, IpsecSiteConnection, TransformProtocol,
};
pub use container::{ContainerHealth, HealthCode, IpsecContainer, VpnTopology};
pub use errors::IpsecError;
pub use helper::{HelperCmd, RecordingHelper, ScriptHelper, VpnHelper};
