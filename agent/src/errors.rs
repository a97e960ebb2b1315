// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by the agent binary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("service {0} failed to start")]
    StartFailed(String),

    #[error("bad configuration: {0}")]
    Config(String),

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}
