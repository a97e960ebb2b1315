// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod args;
mod config;
mod errors;
mod service;
mod supervisor;

use args::{CmdArgs, Parser};
use errors::AgentError;
use service::VpnContainerService;
use supervisor::Supervisor;

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(true)
        .init();
}

async fn run(args: CmdArgs) -> Result<(), AgentError> {
    let config = match &args.config {
        Some(path) => config::load(path)?,
        None => config::AgentConfig {
            name: "agent".to_owned(),
            vpn: None,
        },
    };
    info!("{}: starting", config.name);

    let mut supervisor = Supervisor::new();
    if let Some(vpn) = config.vpn {
        supervisor.register(Box::new(VpnContainerService::new(vpn)));
    }
    supervisor.start_all().await?;
    info!("{}: running, ctrl-c to stop", config.name);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("signal wait failed: {e}");
    }
    supervisor.stop_all().await;
    info!("{}: bye", config.name);
    Ok(())
}

fn main() {
    let args = CmdArgs::parse();
    init_tracing(&args.log_level);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("tokio runtime creation failed");
    if let Err(e) = rt.block_on(run(args)) {
        error!("agent failed: {e}");
        std::process::exit(1);
    }
}
