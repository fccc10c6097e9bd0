//! Backend variant for the host's own engine socket.
//!
//! Talks to the engine through bollard. Listing inspects each container so
//! the payload shape matches the inspect form the normalizer prefers; a
//! container that vanishes between list and inspect is skipped. Compose has
//! no engine API and runs as a subprocess.

use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RestartContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{instrument, warn};

use dockhand_common::{
    ComposeAction, ContainerRecord, ImageRecord, ImageSize, LogQuery, Tail,
};

use crate::normalize;
use crate::stream::LogStream;
use crate::{filter_log_lines, Backend, BackendError, Result};

pub struct LocalBackend {
    docker: Docker,
    host_name: String,
}

impl LocalBackend {
    pub fn new(host_name: impl Into<String>) -> Result<Self> {
        let host_name = host_name.into();
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            BackendError::Connection {
                host: host_name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { docker, host_name })
    }
}

#[async_trait]
impl Backend for LocalBackend {
    #[instrument(skip(self), fields(host = %self.host_name))]
    async fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(docker_err)?;

        let mut records = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self
                .docker
                .inspect_container(&id, None::<InspectContainerOptions>)
                .await
            {
                Ok(inspect) => {
                    let raw = serde_json::to_value(&inspect)
                        .map_err(|e| BackendError::Parse(e.to_string()))?;
                    records.push(normalize::container_record(&self.host_name, &raw));
                }
                // Containers removed between list and inspect degrade the
                // listing, not the whole call.
                Err(e) => warn!(host = %self.host_name, id, error = %e, "inspect failed, skipping"),
            }
        }
        Ok(records)
    }

    #[instrument(skip(self), fields(host = %self.host_name))]
    async fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await
            .map_err(docker_err)?;

        let mut records = Vec::new();
        for image in images {
            let short_id: String = image
                .id
                .trim_start_matches("sha256:")
                .chars()
                .take(12)
                .collect();
            let created = DateTime::<Utc>::from_timestamp(image.created, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "Unknown".to_string());
            let size = ImageSize::Bytes(image.size.max(0) as u64);

            // One record per tag, the way the dashboard renders them.
            let tags = if image.repo_tags.is_empty() {
                vec![short_id.clone()]
            } else {
                image.repo_tags
            };
            for tag in tags {
                records.push(ImageRecord {
                    id: short_id.clone(),
                    tag,
                    created: created.clone(),
                    size: size.clone(),
                });
            }
        }
        Ok(records)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_err)
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await
            .map_err(docker_err)
    }

    async fn restart_container(&self, id: &str) -> Result<()> {
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
            .map_err(docker_err)
    }

    /// No forced removal: a conflict (image still in use) surfaces as the
    /// engine's error instead of being silently forced.
    async fn delete_image(&self, id: &str) -> Result<()> {
        self.docker
            .remove_image(
                id,
                Some(RemoveImageOptions {
                    force: false,
                    ..Default::default()
                }),
                None,
            )
            .await
            .map_err(docker_err)?;
        Ok(())
    }

    #[instrument(skip(self), fields(host = %self.host_name, path))]
    async fn run_compose(&self, path: &str, action: ComposeAction) -> Result<String> {
        let path = path.replace('\'', "");
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(format!("cd '{path}' && docker compose {}", action.cli_args()))
            .output()
            .await?;
        if !output.status.success() {
            return Err(BackendError::Command {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn get_logs(&self, id: &str, query: &LogQuery) -> Result<String> {
        let options = LogsOptions::<String> {
            follow: false,
            stdout: true,
            stderr: true,
            since: parse_time_bound(query.since.as_deref()).unwrap_or(0),
            until: parse_time_bound(query.until.as_deref()).unwrap_or(0),
            timestamps: false,
            tail: query.tail.to_string(),
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut logs = String::new();
        while let Some(item) = stream.next().await {
            let chunk = item.map_err(docker_err)?;
            logs.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
        }
        Ok(filter_log_lines(&logs, query.search.as_deref()))
    }

    #[instrument(skip(self), fields(host = %self.host_name, id))]
    async fn stream_logs(&self, id: &str, tail: Tail) -> Result<LogStream> {
        let docker = self.docker.clone();
        let id = id.to_string();
        let host_name = self.host_name.clone();
        let (sink, stream) = LogStream::channel();

        tokio::spawn(async move {
            let options = LogsOptions::<String> {
                follow: true,
                stdout: true,
                stderr: true,
                tail: tail.to_string(),
                ..Default::default()
            };
            let source = docker.logs(&id, Some(options));
            futures::pin_mut!(source);
            while let Some(item) = source.next().await {
                match item {
                    Ok(chunk) => {
                        let text = String::from_utf8_lossy(&chunk.into_bytes()).into_owned();
                        if !sink.send(text).await {
                            // Consumer hung up; dropping the source closes
                            // the engine connection.
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(host = %host_name, id, error = %e, "local log stream failed");
                        let _ = sink.send(format!("Error streaming logs: {e}\n")).await;
                        return;
                    }
                }
            }
        });

        Ok(stream)
    }
}

fn docker_err(e: bollard::errors::Error) -> BackendError {
    match e {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message,
        } => BackendError::NotFound(message),
        other => BackendError::Docker(other),
    }
}

/// Accepts unix seconds, RFC3339, or the CLI's relative `N{s,m,h,d}` form.
/// Anything else (including empty) means "no bound".
fn parse_time_bound(value: Option<&str>) -> Option<i64> {
    let s = value?.trim();
    if s.is_empty() || !s.is_ascii() {
        return None;
    }
    if let Ok(secs) = s.parse::<i64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    let (num, unit) = s.split_at(s.len() - 1);
    let n: i64 = num.parse().ok()?;
    let seconds = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3_600,
        "d" => n * 86_400,
        _ => return None,
    };
    Some((Utc::now() - chrono::Duration::seconds(seconds)).timestamp())
}
