//! Backend variant for hosts reachable only over SSH.
//!
//! Every operation maps to one `docker` CLI invocation executed through a
//! transient [`SshSession`]. Listings use `--format '{{json .}}'` (one JSON
//! object per line); each line is remapped to the inspect-ish key set and
//! normalized, and a malformed line is skipped rather than failing the
//! batch.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use dockhand_common::{ComposeAction, ContainerRecord, HostDescriptor, ImageRecord, LogQuery, Tail};

use crate::normalize;
use crate::ssh::{CommandOutput, SshSession};
use crate::stream::LogStream;
use crate::{filter_log_lines, run_blocking, sanitize_ref, Backend, BackendError, Result};

pub struct RemoteBackend {
    host: HostDescriptor,
}

impl RemoteBackend {
    pub fn new(host: HostDescriptor) -> Self {
        Self { host }
    }

    /// Open a session, run one command, tear the session down. Non-zero
    /// exits become command errors; "no such" diagnostics are narrowed to
    /// not-found.
    async fn exec_checked(&self, command: String) -> Result<CommandOutput> {
        let host = self.host.clone();
        run_blocking(move || SshSession::connect(&host)?.exec_checked(&command))
            .await
            .map_err(narrow_not_found)
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    #[instrument(skip(self), fields(host = %self.host.name))]
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        let output = self
            .exec_checked("docker ps -a --format '{{json .}}'".to_string())
            .await?;
        Ok(parse_container_lines(&self.host.name, &output.stdout))
    }

    #[instrument(skip(self), fields(host = %self.host.name))]
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let output = self
            .exec_checked("docker images --format '{{json .}}'".to_string())
            .await?;
        Ok(parse_image_lines(&output.stdout))
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.exec_checked(format!("docker start {}", sanitize_ref(id)))
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.exec_checked(format!("docker stop {}", sanitize_ref(id)))
            .await?;
        Ok(())
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        self.exec_checked(format!("docker restart {}", sanitize_ref(id)))
            .await?;
        Ok(())
    }

    /// No forced removal: an in-use image surfaces the CLI's conflict error.
    async fn delete_image(&self, id: &str) -> Result<()> {
        self.exec_checked(format!("docker rmi {}", sanitize_ref(id)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.host.name, path))]
    async fn run_compose(&self, path: &str, action: ComposeAction) -> Result<String> {
        let output = self.exec_checked(compose_command(path, action)).await?;
        Ok(output.stdout)
    }

    async fn get_logs(&self, id: &str, query: &LogQuery) -> Result<String> {
        let output = self.exec_checked(logs_command(id, query)).await?;
        // `docker logs` writes the container's stderr stream to stderr.
        Ok(filter_log_lines(
            &output.combined(),
            query.search.as_deref(),
        ))
    }

    #[instrument(skip(self), fields(host = %self.host.name, id))]
    async fn stream_logs(&self, id: &str, tail: Tail) -> Result<LogStream> {
        let host = self.host.clone();
        let command = format!("docker logs -f --tail {} {} 2>&1", tail, sanitize_ref(id));
        Ok(LogStream::from_blocking(move |sink| {
            let result = SshSession::connect(&host).and_then(|s| s.exec_streamed(&command, &sink));
            if let Err(e) = result {
                // Terminal failure becomes a final inline chunk instead of
                // an abrupt disconnect.
                warn!(host = %host.name, error = %e, "remote log stream failed");
                sink.send(format!("Error streaming logs from {}: {e}\n", host.name));
            }
        }))
    }
}

/// Remap a `docker ps` JSON line to the key set the normalizer prefers.
/// CLI keys: ID, Names (string), Image, State, Status, Ports, CreatedAt,
/// Labels (delimited string).
fn remap_cli_container(raw: &Value) -> Value {
    json!({
        "Id": raw.get("ID").cloned().unwrap_or(Value::Null),
        "Names": raw.get("Names").map(|n| json!([n])).unwrap_or(Value::Null),
        "Image": raw.get("Image").cloned().unwrap_or(Value::Null),
        "State": raw.get("State").cloned().unwrap_or(Value::Null),
        "Status": raw.get("Status").cloned().unwrap_or(Value::Null),
        "Ports": raw.get("Ports").cloned().unwrap_or(Value::Null),
        "Created": raw.get("CreatedAt").cloned().unwrap_or(Value::Null),
        "Labels": raw.get("Labels").cloned().unwrap_or(Value::Null),
    })
}

fn parse_container_lines(host: &str, output: &str) -> Vec<ContainerRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(raw) => Some(normalize::container_record(host, &remap_cli_container(&raw))),
            Err(e) => {
                warn!(host, error = %e, "skipping malformed container listing line");
                None
            }
        })
        .collect()
}

fn parse_image_lines(output: &str) -> Vec<ImageRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(raw) => Some(normalize::image_record(&raw)),
            Err(e) => {
                warn!(error = %e, "skipping malformed image listing line");
                None
            }
        })
        .collect()
}

fn compose_command(path: &str, action: ComposeAction) -> String {
    // Single quotes in the path are dropped rather than escaped; this is an
    // operator tool, not a general shell escaper.
    let path = path.replace('\'', "");
    format!("cd '{path}' && docker compose {}", action.cli_args())
}

fn logs_command(id: &str, query: &LogQuery) -> String {
    let mut command = format!("docker logs --tail {}", query.tail);
    if let Some(since) = time_bound(&query.since) {
        command.push_str(&format!(" --since '{since}'"));
    }
    if let Some(until) = time_bound(&query.until) {
        command.push_str(&format!(" --until '{until}'"));
    }
    command.push(' ');
    command.push_str(&sanitize_ref(id));
    command
}

fn time_bound(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.replace('\'', ""))
}

fn narrow_not_found(err: BackendError) -> BackendError {
    if let BackendError::Command { stderr, .. } = &err {
        if stderr.to_lowercase().contains("no such") {
            return BackendError::NotFound(stderr.clone());
        }
    }
    err
}
