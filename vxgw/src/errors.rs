// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum VxgwError {
    #[error("State access failed: {0}")]
    State(String),

    #[error("VTEP at {0} is not reachable: {1}")]
    PeerUnavailable(String, String),
}
