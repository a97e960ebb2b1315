// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The vpn-helper command surface.
//!
//! The helper is an external program with a positional command followed by
//! flags; exit code 0 is success, anything else fails the invocation. The
//! container only ever talks to the [`VpnHelper`] trait so tests can record
//! and fail invocations deterministically.

use crate::errors::IpsecError;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;
use tracing::debug;

use ipnet::Ipv4Net;
use net::Mac;

/// One invocation of the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperCmd {
    Prepare,
    CleanNs {
        name: String,
    },
    MakeNs {
        name: String,
        gateway_ip: Ipv4Addr,
        gateway_mac: Mac,
        local_ip: Ipv4Addr,
        iface_cidr: Ipv4Net,
        local_mac: Mac,
    },
    StartService {
        name: String,
        path: PathBuf,
    },
    InitConns {
        name: String,
        path: PathBuf,
        gateway_ip: Ipv4Addr,
        conns: Vec<String>,
    },
    StopService {
        name: String,
        path: PathBuf,
    },
}

impl HelperCmd {
    /// The exact argument vector handed to the helper.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        match self {
            HelperCmd::Prepare => vec!["prepare".into()],
            HelperCmd::CleanNs { name } => {
                vec!["cleanns".into(), "-n".into(), name.clone()]
            }
            HelperCmd::MakeNs {
                name,
                gateway_ip,
                gateway_mac,
                local_ip,
                iface_cidr,
                local_mac,
            } => vec![
                "makens".into(),
                "-n".into(),
                name.clone(),
                "-g".into(),
                gateway_ip.to_string(),
                "-G".into(),
                gateway_mac.to_string(),
                "-l".into(),
                local_ip.to_string(),
                "-i".into(),
                iface_cidr.to_string(),
                "-m".into(),
                local_mac.to_string(),
            ],
            HelperCmd::StartService { name, path } => vec![
                "start_service".into(),
                "-n".into(),
                name.clone(),
                "-p".into(),
                path.display().to_string(),
            ],
            HelperCmd::InitConns {
                name,
                path,
                gateway_ip,
                conns,
            } => {
                let mut args = vec![
                    "init_conns".into(),
                    "-n".into(),
                    name.clone(),
                    "-p".into(),
                    path.display().to_string(),
                    "-g".into(),
                    gateway_ip.to_string(),
                ];
                for conn in conns {
                    args.push("-c".into());
                    args.push(conn.clone());
                }
                args
            }
            HelperCmd::StopService { name, path } => vec![
                "stop_service".into(),
                "-n".into(),
                name.clone(),
                "-p".into(),
                path.display().to_string(),
            ],
        }
    }

    /// The positional command name.
    #[must_use]
    pub fn command(&self) -> &'static str {
        match self {
            HelperCmd::Prepare => "prepare",
            HelperCmd::CleanNs { .. } => "cleanns",
            HelperCmd::MakeNs { .. } => "makens",
            HelperCmd::StartService { .. } => "start_service",
            HelperCmd::InitConns { .. } => "init_conns",
            HelperCmd::StopService { .. } => "stop_service",
        }
    }
}

impl Display for HelperCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

/// Invokes the helper; ordering of invocations is the container's contract.
pub trait VpnHelper: Send + Sync {
    /// Run one command to completion.
    ///
    /// # Errors
    ///
    /// [`IpsecError::HelperFailed`] on a non-zero exit.
    fn run(&self, cmd: &HelperCmd) -> Result<(), IpsecError>;
}

impl<T: VpnHelper + ?Sized> VpnHelper for std::sync::Arc<T> {
    fn run(&self, cmd: &HelperCmd) -> Result<(), IpsecError> {
        (**self).run(cmd)
    }
}

/// Production helper: spawns the configured executable.
pub struct ScriptHelper {
    script: PathBuf,
}

impl ScriptHelper {
    #[must_use]
    pub fn new(script: PathBuf) -> Self {
        Self { script }
    }
}

impl VpnHelper for ScriptHelper {
    fn run(&self, cmd: &HelperCmd) -> Result<(), IpsecError> {
        debug!("running {} {cmd}", self.script.display());
        let status = Command::new(&self.script).args(cmd.to_args()).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(IpsecError::HelperFailed {
                cmd: cmd.to_string(),
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Test helper: records the invocation trace and can be told to fail the
/// n-th call.
#[derive(Default)]
pub struct RecordingHelper {
    log: Mutex<Vec<String>>,
    fail_at: Mutex<Option<usize>>,
}

impl RecordingHelper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`-th invocation (1-based) with a non-zero exit.
    #[must_use]
    pub fn failing_at(n: usize) -> Self {
        let helper = Self::new();
        *helper.fail_at.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(n);
        helper
    }

    /// The commands run so far, rendered as full argument lines.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// The positional command names run so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.log()
            .iter()
            .map(|line| {
                line.split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_owned()
            })
            .collect()
    }
}

impl VpnHelper for RecordingHelper {
    fn run(&self, cmd: &HelperCmd) -> Result<(), IpsecError> {
        let count = {
            let mut log = self
                .log
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            log.push(cmd.to_string());
            log.len()
        };
        let fail = *self
            .fail_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if fail == Some(count) {
            return Err(IpsecError::HelperFailed {
                cmd: cmd.to_string(),
                code: 1,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_surfaces_are_stable() {
        let cmd = HelperCmd::MakeNs {
            name: "vpn-x".into(),
            gateway_ip: "169.254.0.1".parse().unwrap(),
            gateway_mac: "02:00:00:00:00:02".parse().unwrap(),
            local_ip: "100.64.0.2".parse().unwrap(),
            iface_cidr: "169.254.0.2/30".parse().unwrap(),
            local_mac: "02:00:00:00:00:01".parse().unwrap(),
        };
        assert_eq!(
            cmd.to_string(),
            "makens -n vpn-x -g 169.254.0.1 -G 02:00:00:00:00:02 \
             -l 100.64.0.2 -i 169.254.0.2/30 -m 02:00:00:00:00:01"
        );

        let cmd = HelperCmd::InitConns {
            name: "vpn-x".into(),
            path: PathBuf::from("/tmp/vpn-x"),
            gateway_ip: "169.254.0.1".parse().unwrap(),
            conns: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            cmd.to_string(),
            "init_conns -n vpn-x -p /tmp/vpn-x -g 169.254.0.1 -c a -c b"
        );
    }

    #[test]
    fn recording_helper_fails_on_cue() {
        let helper = RecordingHelper::failing_at(2);
        assert!(helper.run(&HelperCmd::Prepare).is_ok());
        let err = helper
            .run(&HelperCmd::CleanNs { name: "x".into() })
            .unwrap_err();
        assert!(matches!(err, IpsecError::HelperFailed { .. }));
        assert_eq!(helper.commands(), vec!["prepare", "cleanns"]);
    }
}
