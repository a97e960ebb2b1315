// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The error results used by this library.

use crate::ports::PortId;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum RouterError {
    #[error("Deadline exceeded")]
    Timeout,

    #[error("No such port ({0})")]
    NoSuchPort(PortId),

    #[error("Route with PORT next-hop must carry a port id")]
    RouteWithoutPort,

    #[error("State access failed: {0}")]
    State(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(&'static str),
}
