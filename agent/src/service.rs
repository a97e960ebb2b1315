// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Supervised wrapper around one IPsec container.

use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::VpnConfig;
use crate::supervisor::Service;
use ipsec::{IpsecConfig, IpsecContainer, IpsecError, ScriptHelper, VpnTopology};

/// [`VpnTopology`] backed by the agent's static configuration file. The
/// change feed never fires; updates arrive by restarting the agent.
struct StaticVpnTopology {
    interface: String,
    config: IpsecConfig,
    tx: broadcast::Sender<()>,
}

impl VpnTopology for StaticVpnTopology {
    fn external_interface(&self) -> Result<String, IpsecError> {
        Ok(self.interface.clone())
    }
    fn resolve(&self) -> Result<Option<IpsecConfig>, IpsecError> {
        Ok(Some(self.config.clone()))
    }
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

/// One supervised VPN container.
pub struct VpnContainerService {
    name: String,
    config: VpnConfig,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl VpnContainerService {
    #[must_use]
    pub fn new(config: VpnConfig) -> Self {
        Self {
            name: format!("vpn/{}", config.service.name),
            config,
            stop: None,
            handle: None,
        }
    }
}

impl Service for VpnContainerService {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, ready: oneshot::Sender<()>) {
        let (stop_tx, stop_rx) = oneshot::channel();
        self.stop = Some(stop_tx);
        let vpn = self.config.clone();
        let name = self.name.clone();
        self.handle = Some(tokio::spawn(async move {
            let (tx, _) = broadcast::channel(16);
            let topology = Arc::new(StaticVpnTopology {
                interface: vpn.interface,
                config: IpsecConfig {
                    service: vpn.service,
                    connections: vpn.connections,
                },
                tx,
            });
            let helper = ScriptHelper::new(vpn.helper);
            let (mut container, _health) = IpsecContainer::new(helper, topology);

            match container.create() {
                Ok(iface) => {
                    info!("{name}: container up on {iface:?}");
                    let _ = ready.send(());
                }
                Err(e) => {
                    // dropping `ready` reports the start failure
                    error!("{name}: create failed: {e}");
                    return;
                }
            }

            let mut stop_rx = stop_rx;
            let stopped = tokio::select! {
                _ = &mut stop_rx => true,
                result = container.watch() => {
                    if let Err(e) = result {
                        error!("{name}: watch ended: {e}");
                    }
                    false
                }
            };
            if stopped {
                container.delete();
                info!("{name}: container deleted");
            }
        }));
    }

    fn stop(&mut self) -> Option<JoinHandle<()>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.take()
    }
}
