//! Heterogeneous Docker backend: one capability set, two transports.
//!
//! A [`HostDescriptor`] names either the local engine socket or a remote
//! machine reachable over SSH. [`backend_for`] selects the matching
//! [`Backend`] variant once per host; from there every operation goes
//! through the same trait, produces the same canonical records, and runs
//! its blocking I/O off the scheduler through [`run_blocking`].

use async_trait::async_trait;
use thiserror::Error;

use dockhand_common::{
    ComposeAction, ContainerRecord, DockhandError, HostDescriptor, HostKind, ImageRecord,
    LogQuery, Tail,
};

pub mod local;
pub mod normalize;
pub mod poller;
pub mod remote;
pub mod ssh;
pub mod stream;

pub use poller::{collect_fleet, StatusPoller, POLL_INTERVAL};
pub use stream::LogStream;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    #[error("command exited with status {status}: {stderr}")]
    Command { status: i32, stderr: String },

    #[error("malformed payload: {0}")]
    Parse(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("host {host} unreachable: {reason}")]
    HostUnreachable { host: String, reason: String },

    #[error("docker api error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<BackendError> for DockhandError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Connection { .. } => DockhandError::Connection(err.to_string()),
            BackendError::Command { .. } => DockhandError::Command(err.to_string()),
            BackendError::Parse(msg) => DockhandError::Parse(msg),
            BackendError::NotFound(msg) => DockhandError::NotFound(msg),
            BackendError::HostUnreachable { .. } => {
                DockhandError::HostUnreachable(err.to_string())
            }
            BackendError::Io(e) => DockhandError::Io(e),
            other => DockhandError::Internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// The capability set every host kind supports.
///
/// Listing operations return fully materialized vectors so callers can
/// aggregate across hosts. Mutating operations issue exactly one underlying
/// command or API call and never retry.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>>;
    async fn list_images(&self) -> Result<Vec<ImageRecord>>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str) -> Result<()>;
    async fn restart_container(&self, id: &str) -> Result<()>;
    async fn delete_image(&self, id: &str) -> Result<()>;
    async fn run_compose(&self, path: &str, action: ComposeAction) -> Result<String>;
    async fn get_logs(&self, id: &str, query: &LogQuery) -> Result<String>;
    async fn stream_logs(&self, id: &str, tail: Tail) -> Result<LogStream>;
}

/// Select the backend variant for a host. Done once per operation; each
/// backend owns its connection exclusively for its lifetime, so no state is
/// shared across concurrent operations.
pub fn backend_for(host: &HostDescriptor) -> Result<Box<dyn Backend>> {
    match host.kind {
        HostKind::Local => Ok(Box::new(local::LocalBackend::new(&host.name)?)),
        HostKind::Remote => Ok(Box::new(remote::RemoteBackend::new(host.clone()))),
    }
}

/// The single bridge for blocking work (SSH sessions, subprocess waits).
/// Every backend operation that would block the scheduler goes through
/// here, so suspension points stay auditable in one place.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Strip anything that could escape a shell word out of a container or
/// image reference before it is spliced into a remote command line.
pub(crate) fn sanitize_ref(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '/'))
        .collect()
}

/// Case-insensitive substring filter applied to one-shot log output, after
/// fetch, identically for both backend variants.
pub(crate) fn filter_log_lines(logs: &str, search: Option<&str>) -> String {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        None => logs.to_string(),
        Some(needle) => {
            let needle = needle.to_lowercase();
            logs.lines()
                .filter(|line| line.to_lowercase().contains(&needle))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}
