// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpsecError {
    /// Any non-zero exit of the vpn-helper.
    #[error("vpn-helper failed: `{cmd}` exited with {code}")]
    HelperFailed { cmd: String, code: i32 },

    #[error("router has no external port")]
    NoExternalPort,

    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("state access failed: {0}")]
    State(String),
}
