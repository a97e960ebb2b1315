// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A plain supervisor over named child services.
//!
//! Children start in registration order and stop in reverse. `start` hands
//! each child a ready completion; a child that does not complete it within
//! the deadline (or drops it) is a start failure.

use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::errors::AgentError;

/// Contract each supervised component implements.
pub trait Service: Send {
    fn name(&self) -> &str;

    /// Begin operating; complete `ready` once operational. Dropping the
    /// sender signals a failed start.
    fn start(&mut self, ready: oneshot::Sender<()>);

    /// Begin an orderly shutdown. The returned handle, if any, completes
    /// when the shutdown has finished.
    fn stop(&mut self) -> Option<JoinHandle<()>>;
}

/// Owns the children and their start/stop ordering.
pub struct Supervisor {
    children: Vec<Box<dyn Service>>,
    start_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            start_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn register(&mut self, child: Box<dyn Service>) {
        self.children.push(child);
    }

    /// Resolve a child by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&dyn Service> {
        self.children
            .iter()
            .find(|c| c.name() == name)
            .map(|c| &**c)
    }

    /// Start every child in registration order.
    ///
    /// # Errors
    ///
    /// [`AgentError::StartFailed`] when a child misses its ready deadline
    /// or drops the completion.
    pub async fn start_all(&mut self) -> Result<(), AgentError> {
        for child in &mut self.children {
            let name = child.name().to_owned();
            let (ready_tx, ready_rx) = oneshot::channel();
            child.start(ready_tx);
            match tokio::time::timeout(self.start_timeout, ready_rx).await {
                Ok(Ok(())) => info!("service {name} started"),
                Ok(Err(_)) => {
                    error!("service {name} failed to start");
                    return Err(AgentError::StartFailed(name));
                }
                Err(_) => {
                    error!("service {name} did not become ready in time");
                    return Err(AgentError::StartFailed(name));
                }
            }
        }
        Ok(())
    }

    /// Stop every child, last-started first, waiting out each shutdown.
    pub async fn stop_all(&mut self) {
        for child in self.children.iter_mut().rev() {
            let name = child.name().to_owned();
            if let Some(handle) = child.stop() {
                let _ = handle.await;
            }
            info!("service {name} stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Prompt {
        name: String,
        order: Arc<AtomicUsize>,
        started_at: Arc<AtomicUsize>,
        stopped_at: Arc<AtomicUsize>,
    }

    impl Service for Prompt {
        fn name(&self) -> &str {
            &self.name
        }
        fn start(&mut self, ready: oneshot::Sender<()>) {
            self.started_at
                .store(self.order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            let _ = ready.send(());
        }
        fn stop(&mut self) -> Option<JoinHandle<()>> {
            self.stopped_at
                .store(self.order.fetch_add(1, Ordering::SeqCst), Ordering::SeqCst);
            None
        }
    }

    struct Mute;
    impl Service for Mute {
        fn name(&self) -> &str {
            "mute"
        }
        fn start(&mut self, ready: oneshot::Sender<()>) {
            // never completes the handshake
            drop(ready);
        }
        fn stop(&mut self) -> Option<JoinHandle<()>> {
            None
        }
    }

    fn prompt(name: &str, order: &Arc<AtomicUsize>) -> (Prompt, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(usize::MAX));
        let stopped = Arc::new(AtomicUsize::new(usize::MAX));
        (
            Prompt {
                name: name.to_owned(),
                order: order.clone(),
                started_at: started.clone(),
                stopped_at: stopped.clone(),
            },
            started,
            stopped,
        )
    }

    #[tokio::test]
    async fn starts_in_order_and_stops_in_reverse() {
        let order = Arc::new(AtomicUsize::new(0));
        let (a, a_started, a_stopped) = prompt("a", &order);
        let (b, b_started, b_stopped) = prompt("b", &order);

        let mut supervisor = Supervisor::new();
        supervisor.register(Box::new(a));
        supervisor.register(Box::new(b));
        supervisor.start_all().await.unwrap();
        supervisor.stop_all().await;

        assert!(a_started.load(Ordering::SeqCst) < b_started.load(Ordering::SeqCst));
        assert!(b_stopped.load(Ordering::SeqCst) < a_stopped.load(Ordering::SeqCst));
        assert!(supervisor.child("a").is_some());
        assert!(supervisor.child("missing").is_none());
    }

    #[tokio::test]
    async fn dropped_handshake_is_a_start_failure() {
        let mut supervisor = Supervisor::new().with_start_timeout(Duration::from_millis(100));
        supervisor.register(Box::new(Mute));
        let err = supervisor.start_all().await.unwrap_err();
        assert!(matches!(err, AgentError::StartFailed(name) if name == "mute"));
    }
}
