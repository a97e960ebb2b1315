// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lifecycle of one IPsec VPN container.
//!
//! Setup is all-or-nothing: a failure in the helper sequence rolls back the
//! already-executed prefix in inverse order before the error surfaces.
//! Lifecycle methods take `&mut self`, so one call is in flight per
//! container at any time.

use std::fs;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{sanitize_name, IpsecConfig};
use crate::errors::IpsecError;
use crate::helper::{HelperCmd, VpnHelper};

/// Coarse container state for the health feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCode {
    Running,
    Stopping,
    Stopped,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHealth {
    pub code: HealthCode,
    pub description: String,
}

impl ContainerHealth {
    fn stopped() -> Self {
        Self {
            code: HealthCode::Stopped,
            description: String::new(),
        }
    }
}

/// The slice of the virtual topology the container reads: the router's
/// external interface, the resolved VPN configuration, and a change feed.
pub trait VpnTopology: Send + Sync {
    /// Name of the interface the VPN traffic leaves through.
    ///
    /// # Errors
    ///
    /// [`IpsecError::NoExternalPort`] when the router has none.
    fn external_interface(&self) -> Result<String, IpsecError>;

    /// The current configuration; `None` while the service is admin-down.
    ///
    /// # Errors
    ///
    /// [`IpsecError::State`] on store failures.
    fn resolve(&self) -> Result<Option<IpsecConfig>, IpsecError>;

    /// Fires on any change to the service or its connection set.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// One VPN container: renders configuration, owns its working directory
/// and drives the helper.
pub struct IpsecContainer<H: VpnHelper> {
    helper: H,
    topology: Arc<dyn VpnTopology>,
    health: watch::Sender<ContainerHealth>,
    /// The configuration currently set up, if any.
    current: Option<IpsecConfig>,
    /// Topology subscription; `None` once deleted.
    events: Option<broadcast::Receiver<()>>,
}

impl<H: VpnHelper> IpsecContainer<H> {
    #[must_use]
    pub fn new(helper: H, topology: Arc<dyn VpnTopology>) -> (Self, watch::Receiver<ContainerHealth>) {
        let (health, health_rx) = watch::channel(ContainerHealth::stopped());
        (
            Self {
                helper,
                topology,
                health,
                current: None,
                events: None,
            },
            health_rx,
        )
    }

    /// Bring the container up. Returns the external interface name, or
    /// `None` (without side effects) while the service is admin-down; the
    /// topology subscription is established either way.
    ///
    /// # Errors
    ///
    /// Fails when the router has no external port or the setup sequence
    /// fails.
    pub fn create(&mut self) -> Result<Option<String>, IpsecError> {
        let iface = self.topology.external_interface()?;
        // subscribe before resolving so no change can slip in between
        self.events = Some(self.topology.subscribe());

        let Some(config) = self.topology.resolve()? else {
            debug!("vpn service admin-down, container stays idle");
            return Ok(None);
        };
        if let Err(e) = self.setup(&config) {
            let _ = self.health.send(ContainerHealth {
                code: HealthCode::Error,
                description: e.to_string(),
            });
            return Err(e);
        }
        self.current = Some(config);
        let _ = self.health.send(ContainerHealth {
            code: HealthCode::Running,
            description: iface.clone(),
        });
        Ok(Some(iface))
    }

    /// Tear down and, when the re-resolved configuration has admin-up
    /// connections, set up again.
    ///
    /// # Errors
    ///
    /// Setup failures surface after their rollback.
    pub fn update(&mut self) -> Result<(), IpsecError> {
        if let Some(old) = self.current.take() {
            self.cleanup(&old);
        }
        match self.topology.resolve()? {
            Some(config) if !config.is_empty() => {
                if let Err(e) = self.setup(&config) {
                    let _ = self.health.send(ContainerHealth {
                        code: HealthCode::Error,
                        description: e.to_string(),
                    });
                    return Err(e);
                }
                self.current = Some(config);
                let iface = self.topology.external_interface()?;
                let _ = self.health.send(ContainerHealth {
                    code: HealthCode::Running,
                    description: iface,
                });
            }
            _ => {
                // stay torn down until a change restores the config
                let _ = self.health.send(ContainerHealth::stopped());
            }
        }
        Ok(())
    }

    /// Tear down (when running) and drop the topology subscription.
    /// Idempotent, also when the container never started.
    pub fn delete(&mut self) {
        let _ = self.health.send(ContainerHealth {
            code: HealthCode::Stopping,
            description: String::new(),
        });
        if let Some(old) = self.current.take() {
            self.cleanup(&old);
        }
        self.events = None;
        let _ = self.health.send(ContainerHealth::stopped());
    }

    /// Drive topology-triggered updates until the container is deleted.
    ///
    /// # Errors
    ///
    /// Propagates update failures; [`IpsecError::State`] when the topology
    /// feed dies.
    pub async fn watch(&mut self) -> Result<(), IpsecError> {
        loop {
            let Some(events) = self.events.as_mut() else {
                return Ok(());
            };
            match events.recv().await {
                Ok(()) => self.update()?,
                // missed events collapse into one refresh
                Err(broadcast::error::RecvError::Lagged(_)) => self.update()?,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(IpsecError::State("topology subscription closed".to_owned()));
                }
            }
        }
    }

    /// Write the working directory and run the helper sequence, rolling
    /// back the executed prefix on failure.
    fn setup(&self, config: &IpsecConfig) -> Result<(), IpsecError> {
        let svc = &config.service;
        let path = &svc.filepath;
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
        let etc = path.join("etc");
        fs::create_dir_all(&etc)?;
        fs::write(etc.join("ipsec.conf"), config.render_conf())?;
        fs::write(etc.join("ipsec.secrets"), config.render_secrets())?;
        info!("setting up vpn container {} at {}", svc.name, path.display());

        let name = svc.name.clone();
        self.helper.run(&HelperCmd::Prepare)?;
        self.helper.run(&HelperCmd::CleanNs { name: name.clone() })?;

        if let Err(e) = self.helper.run(&HelperCmd::MakeNs {
            name: name.clone(),
            gateway_ip: svc.namespace_gateway_ip,
            gateway_mac: svc.namespace_gateway_mac,
            local_ip: svc.local_endpoint_ip,
            iface_cidr: svc.namespace_interface_ip,
            local_mac: svc.local_endpoint_mac,
        }) {
            self.rollback(config, false);
            return Err(e);
        }

        if let Err(e) = self.helper.run(&HelperCmd::StartService {
            name: name.clone(),
            path: path.clone(),
        }) {
            self.rollback(config, true);
            return Err(e);
        }

        if let Err(e) = self.helper.run(&HelperCmd::InitConns {
            name,
            path: path.clone(),
            gateway_ip: svc.namespace_gateway_ip,
            conns: config
                .admin_up()
                .map(|conn| sanitize_name(&conn.name))
                .collect(),
        }) {
            self.rollback(config, true);
            return Err(e);
        }
        Ok(())
    }

    /// Compensating cleanup: the inverse of the successfully executed
    /// setup prefix. Best-effort by design of the helper.
    fn rollback(&self, config: &IpsecConfig, service_started: bool) {
        let name = config.service.name.clone();
        if service_started {
            if let Err(e) = self.helper.run(&HelperCmd::StopService {
                name: name.clone(),
                path: config.service.filepath.clone(),
            }) {
                warn!("rollback stop_service failed: {e}");
            }
        }
        if let Err(e) = self.helper.run(&HelperCmd::CleanNs { name }) {
            warn!("rollback cleanns failed: {e}");
        }
    }

    /// Full teardown: stop the service, clean the namespace, remove the
    /// working directory.
    fn cleanup(&self, config: &IpsecConfig) {
        let svc = &config.service;
        if let Err(e) = self.helper.run(&HelperCmd::StopService {
            name: svc.name.clone(),
            path: svc.filepath.clone(),
        }) {
            warn!("stop_service failed during teardown: {e}");
        }
        if let Err(e) = self.helper.run(&HelperCmd::CleanNs {
            name: svc.name.clone(),
        }) {
            warn!("cleanns failed during teardown: {e}");
        }
        if svc.filepath.exists() {
            if let Err(e) = fs::remove_dir_all(&svc.filepath) {
                warn!("could not remove {}: {e}", svc.filepath.display());
            }
        }
    }
}
