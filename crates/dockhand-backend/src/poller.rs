//! Multi-host fan-out and the periodic status feed.
//!
//! One unreachable host degrades coverage, never availability: per-host
//! failures are wrapped as [`BackendError::HostUnreachable`] and reported
//! as sibling entries next to the records that did arrive.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dockhand_common::{FleetSnapshot, HostDescriptor, HostError, StatusEvent};

use crate::{Backend, BackendError, Result};

/// Cadence of the live status feed.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Query every host concurrently and aggregate. The factory is injectable
/// so tests can substitute fake backends; production callers pass
/// [`crate::backend_for`].
pub async fn collect_fleet<F>(hosts: &[HostDescriptor], factory: &F) -> FleetSnapshot
where
    F: Fn(&HostDescriptor) -> Result<Box<dyn Backend>> + Sync,
{
    let queries = hosts.iter().map(|host| async move {
        let result = match factory(host) {
            Ok(backend) => backend.list_containers().await,
            Err(e) => Err(e),
        };
        (host.name.clone(), result)
    });

    let mut snapshot = FleetSnapshot::default();
    for (host, result) in join_all(queries).await {
        match result {
            Ok(mut containers) => snapshot.containers.append(&mut containers),
            Err(e) => {
                let unreachable = BackendError::HostUnreachable {
                    host: host.clone(),
                    reason: e.to_string(),
                };
                warn!(host = %host, error = %e, "excluding host from aggregate");
                snapshot.errors.push(HostError {
                    host,
                    message: unreachable.to_string(),
                });
            }
        }
    }
    snapshot
}

/// Pushes a fleet snapshot to one subscriber on a fixed cadence.
///
/// The loop ends when the subscriber's receiver drops (the send fails), so
/// a disconnect stops the next tick rather than leaking a repeating timer.
/// Per-host failures ride along as typed error events and never terminate
/// the session.
pub struct StatusPoller<H, F> {
    hosts: H,
    factory: F,
    interval: Duration,
}

impl<H, F> StatusPoller<H, F>
where
    H: Fn() -> Vec<HostDescriptor> + Send + Sync,
    F: Fn(&HostDescriptor) -> Result<Box<dyn Backend>> + Send + Sync,
{
    /// `hosts` is re-read every tick so registry changes are picked up
    /// without restarting the feed.
    pub fn new(hosts: H, factory: F) -> Self {
        Self {
            hosts,
            factory,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, tx: mpsc::Sender<StatusEvent>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let hosts = (self.hosts)();
            let snapshot = collect_fleet(&hosts, &self.factory).await;

            let update = StatusEvent::StatusUpdate {
                containers: snapshot.containers,
            };
            if tx.send(update).await.is_err() {
                debug!("status subscriber disconnected, stopping poller");
                return;
            }
            for error in snapshot.errors {
                let event = StatusEvent::Error {
                    message: error.message,
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dockhand_common::{
        ComposeAction, ContainerRecord, HostKind, ImageRecord, LogQuery, Tail,
    };

    struct FakeBackend {
        host: String,
        containers: usize,
        healthy: bool,
    }

    fn record(host: &str, n: usize) -> ContainerRecord {
        ContainerRecord {
            id: format!("{n:012}"),
            name: format!("svc-{n}"),
            image: "nginx:1.25".into(),
            state: "running".into(),
            status: "Up 2 hours".into(),
            ports: String::new(),
            created: "2024-05-01 10:00:00".into(),
            host: host.into(),
            compose_path: String::new(),
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
            if !self.healthy {
                return Err(BackendError::Connection {
                    host: self.host.clone(),
                    reason: "connection refused".into(),
                });
            }
            Ok((0..self.containers)
                .map(|n| record(&self.host, n))
                .collect())
        }

        async fn list_images(&self) -> Result<Vec<ImageRecord>> {
            unimplemented!()
        }
        async fn start_container(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn stop_container(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn restart_container(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn delete_image(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn run_compose(&self, _: &str, _: ComposeAction) -> Result<String> {
            unimplemented!()
        }
        async fn get_logs(&self, _: &str, _: &LogQuery) -> Result<String> {
            unimplemented!()
        }
        async fn stream_logs(&self, _: &str, _: Tail) -> Result<crate::LogStream> {
            unimplemented!()
        }
    }

    fn host(name: &str) -> HostDescriptor {
        let mut h = HostDescriptor::local(name);
        h.kind = HostKind::Remote;
        h
    }

    fn factory(
        unreachable: &'static str,
    ) -> impl Fn(&HostDescriptor) -> Result<Box<dyn Backend>> + Sync {
        move |h: &HostDescriptor| {
            Ok(Box::new(FakeBackend {
                host: h.name.clone(),
                containers: 3,
                healthy: h.name != unreachable,
            }) as Box<dyn Backend>)
        }
    }

    #[tokio::test]
    async fn unreachable_host_becomes_error_entry_not_empty_aggregate() {
        let hosts = vec![host("h1"), host("h2")];
        let snapshot = collect_fleet(&hosts, &factory("h2")).await;

        assert_eq!(snapshot.containers.len(), 3);
        assert!(snapshot.containers.iter().all(|c| c.host == "h1"));
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].host, "h2");
        assert!(snapshot.errors[0].message.contains("h2"));
        assert!(snapshot.errors[0].message.contains("unreachable"));
    }

    #[tokio::test]
    async fn all_healthy_hosts_aggregate_cleanly() {
        let hosts = vec![host("h1"), host("h2")];
        let snapshot = collect_fleet(&hosts, &factory("nobody")).await;
        assert_eq!(snapshot.containers.len(), 6);
        assert!(snapshot.errors.is_empty());
    }

    #[tokio::test]
    async fn poller_emits_updates_and_stops_on_subscriber_drop() {
        let hosts = vec![host("h1"), host("h2")];
        let poller = StatusPoller::new(move || hosts.clone(), factory("h2"))
            .with_interval(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(poller.run(tx));

        match rx.recv().await.expect("first tick") {
            StatusEvent::StatusUpdate { containers } => assert_eq!(containers.len(), 3),
            other => panic!("expected status update, got {other:?}"),
        }
        match rx.recv().await.expect("error event") {
            StatusEvent::Error { message } => assert!(message.contains("h2")),
            other => panic!("expected error event, got {other:?}"),
        }

        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop after subscriber drop")
            .unwrap();
    }
}
