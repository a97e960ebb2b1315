// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

pub(crate) use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Distributed virtual-networking agent", long_about = None)]
pub(crate) struct CmdArgs {
    /// Path to the agent configuration file (TOML).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "routing=trace".
    #[arg(long, value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}
