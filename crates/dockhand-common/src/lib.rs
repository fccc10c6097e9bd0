// Re-export dependencies used in public interfaces of common types

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub use serde::{Deserialize, Serialize};
use thiserror::Error;
pub use uuid;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DockhandError {
    #[error("Connection Error: {0}")]
    Connection(String),

    #[error("Command Error: {0}")]
    Command(String),

    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("Resource Not Found: {0}")]
    NotFound(String),

    #[error("Host Unreachable: {0}")]
    HostUnreachable(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// Define the primary Result type for dockhand operations
pub type Result<T> = std::result::Result<T, DockhandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Local,
    Remote,
}

/// How a remote session authenticates. Resolved from a descriptor via
/// [`HostDescriptor::ssh_auth`]; password wins when both credentials are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    Password(String),
    KeyFile(PathBuf),
}

/// One managed Docker host. Owned by the persistence layer; the core treats
/// it as an immutable value per operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostDescriptor {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub kind: HostKind,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub ssh_user: Option<String>,
    // Never echoed back out of the server.
    #[serde(default, skip_serializing)]
    pub ssh_password: Option<String>,
    #[serde(default)]
    pub ssh_key_path: Option<String>,
}

impl HostDescriptor {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind: HostKind::Local,
            ip: None,
            port: None,
            ssh_user: None,
            ssh_password: None,
            ssh_key_path: None,
        }
    }

    /// Effective SSH port (default 22).
    pub fn ssh_port(&self) -> u16 {
        self.port.unwrap_or(22)
    }

    /// Credential selection with the documented precedence: a configured
    /// password is preferred over a key file when both are present.
    pub fn ssh_auth(&self) -> Option<SshAuth> {
        if let Some(password) = self.ssh_password.as_ref().filter(|p| !p.is_empty()) {
            return Some(SshAuth::Password(password.clone()));
        }
        self.ssh_key_path
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| SshAuth::KeyFile(PathBuf::from(p)))
    }
}

/// Canonical container view, reconstructed fresh on every query.
///
/// `id` is the first 12 characters of the engine identifier; it is only
/// unique within `(host, id)` and must not be used as a global key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub status: String,
    pub ports: String,
    pub created: String,
    pub host: String,
    pub compose_path: String,
}

/// Image size as reported by the backend: the engine API gives bytes, the
/// CLI gives a rendered string ("125MB"). Callers must handle both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Bytes(u64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub tag: String,
    pub created: String,
    pub size: ImageSize,
}

/// One unit of log text delivered to a stream consumer. FIFO within a
/// stream; no ordering guarantee across streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    pub text: String,
}

impl LogChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Number of most-recent log lines to fetch, or all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tail {
    All,
    Lines(u64),
}

impl Default for Tail {
    fn default() -> Self {
        Tail::All
    }
}

impl FromStr for Tail {
    type Err = std::convert::Infallible;

    // Permissive: anything that is not a number means "all".
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().parse::<u64>() {
            Ok(n) => Tail::Lines(n),
            Err(_) => Tail::All,
        })
    }
}

impl Display for Tail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tail::All => write!(f, "all"),
            Tail::Lines(n) => write!(f, "{n}"),
        }
    }
}

/// Parameters for a one-shot log fetch.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub tail: Tail,
    pub since: Option<String>,
    pub until: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeAction {
    Up,
    Down,
}

impl ComposeAction {
    /// Arguments passed to `docker compose`.
    pub fn cli_args(&self) -> &'static str {
        match self {
            ComposeAction::Up => "up -d",
            ComposeAction::Down => "down",
        }
    }
}

/// One per-host failure entry reported alongside successful results by the
/// multi-host fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostError {
    pub host: String,
    pub message: String,
}

/// Aggregate result of querying every configured host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub containers: Vec<ContainerRecord>,
    pub errors: Vec<HostError>,
}

/// Envelope pushed to a live status subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    StatusUpdate { containers: Vec<ContainerRecord> },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_host(password: Option<&str>, key: Option<&str>) -> HostDescriptor {
        HostDescriptor {
            id: Uuid::new_v4(),
            name: "staging".into(),
            kind: HostKind::Remote,
            ip: Some("10.0.0.5".into()),
            port: None,
            ssh_user: Some("ops".into()),
            ssh_password: password.map(Into::into),
            ssh_key_path: key.map(Into::into),
        }
    }

    #[test]
    fn password_preferred_when_both_credentials_set() {
        let host = remote_host(Some("hunter2"), Some("/root/.ssh/id_rsa"));
        assert_eq!(host.ssh_auth(), Some(SshAuth::Password("hunter2".into())));
    }

    #[test]
    fn key_file_used_when_password_absent() {
        let host = remote_host(None, Some("/root/.ssh/id_rsa"));
        assert_eq!(
            host.ssh_auth(),
            Some(SshAuth::KeyFile(PathBuf::from("/root/.ssh/id_rsa")))
        );
    }

    #[test]
    fn password_used_when_key_absent() {
        let host = remote_host(Some("hunter2"), None);
        assert_eq!(host.ssh_auth(), Some(SshAuth::Password("hunter2".into())));
    }

    #[test]
    fn empty_credentials_mean_no_auth() {
        let host = remote_host(Some(""), Some(""));
        assert_eq!(host.ssh_auth(), None);
    }

    #[test]
    fn tail_parses_numbers_and_falls_back_to_all() {
        assert_eq!("500".parse::<Tail>().unwrap(), Tail::Lines(500));
        assert_eq!("all".parse::<Tail>().unwrap(), Tail::All);
        assert_eq!("garbage".parse::<Tail>().unwrap(), Tail::All);
        assert_eq!(Tail::Lines(100).to_string(), "100");
        assert_eq!(Tail::All.to_string(), "all");
    }

    #[test]
    fn status_event_wire_shape() {
        let update = StatusEvent::StatusUpdate { containers: vec![] };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "status_update");
        assert!(json["containers"].is_array());

        let err = StatusEvent::Error {
            message: "host staging unreachable".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "host staging unreachable");
    }

    #[test]
    fn password_is_not_serialized() {
        let host = remote_host(Some("hunter2"), None);
        let json = serde_json::to_value(&host).unwrap();
        assert!(json.get("ssh_password").is_none());
        assert_eq!(json["name"], "staging");
    }
}
