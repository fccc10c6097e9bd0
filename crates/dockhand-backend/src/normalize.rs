//! Pure normalization of heterogeneous raw payloads into canonical records.
//!
//! Two wire shapes feed this module: the engine API's inspect shape
//! (nested `Config`/`State`/`NetworkSettings` objects) and the CLI's
//! `--format '{{json .}}'` shape (flat strings). Normalization never fails;
//! every field degrades to a documented fallback so one malformed host
//! payload cannot blank out a fleet view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use dockhand_common::{ContainerRecord, ImageRecord, ImageSize};

/// Label the compose project working directory is extracted from.
pub const COMPOSE_WORKING_DIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// Normalize one raw container payload (either wire shape) for `host`.
pub fn container_record(host: &str, raw: &Value) -> ContainerRecord {
    container_record_at(host, raw, Utc::now())
}

/// Same as [`container_record`] with an injectable clock for uptime buckets.
pub fn container_record_at(host: &str, raw: &Value, now: DateTime<Utc>) -> ContainerRecord {
    let id: String = raw
        .get("Id")
        .and_then(Value::as_str)
        .or_else(|| raw.get("ID").and_then(Value::as_str))
        .unwrap_or_default()
        .chars()
        .take(12)
        .collect();

    let state = container_state(raw);

    ContainerRecord {
        id,
        name: container_name(raw),
        image: container_image(raw),
        status: status_text(raw, &state, now),
        state,
        ports: ports_summary(raw),
        created: created_text(raw),
        host: host.to_string(),
        compose_path: labels_of(raw)
            .remove(COMPOSE_WORKING_DIR_LABEL)
            .unwrap_or_default(),
    }
}

/// Normalize one `docker images --format '{{json .}}'` line.
pub fn image_record(raw: &Value) -> ImageRecord {
    let field = |key: &str| {
        raw.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };
    let repo = field("Repository").unwrap_or("<none>");
    let tag = field("Tag").unwrap_or("<none>");

    ImageRecord {
        id: field("ID").unwrap_or_default().to_string(),
        tag: format!("{repo}:{tag}"),
        created: truncate_created(field("CreatedAt").unwrap_or("Unknown")),
        size: ImageSize::Text(field("Size").unwrap_or_default().to_string()),
    }
}

fn container_name(raw: &Value) -> String {
    // 'Names' (list) comes from the CLI listing, 'Name' (string) from the
    // inspect shape. Both carry a leading '/'.
    if let Some(Value::Array(names)) = raw.get("Names") {
        if let Some(first) = names.first().and_then(Value::as_str) {
            return first.trim_start_matches('/').to_string();
        }
    }
    if let Some(name) = raw.get("Name").and_then(Value::as_str) {
        return name.trim_start_matches('/').to_string();
    }
    "Unknown".to_string()
}

fn container_image(raw: &Value) -> String {
    raw.get("Config")
        .and_then(|c| c.get("Image"))
        .and_then(Value::as_str)
        .or_else(|| raw.get("Image").and_then(Value::as_str))
        .unwrap_or("Unknown")
        .to_string()
}

fn container_state(raw: &Value) -> String {
    match raw.get("State") {
        Some(Value::Object(state)) => state
            .get("Status")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        Some(Value::String(state)) => state.clone(),
        _ => "unknown".to_string(),
    }
}

fn status_text(raw: &Value, state: &str, now: DateTime<Utc>) -> String {
    if let Some(status) = raw
        .get("Status")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return status.to_string();
    }

    let started_at = raw
        .get("State")
        .and_then(|s| s.get("StartedAt"))
        .and_then(Value::as_str);
    match started_at {
        Some(started) => uptime_text(state, started, now),
        None => "Unknown".to_string(),
    }
}

/// Bucket the uptime of a running container into a human string. Any parse
/// failure on the timestamp yields "Unknown"; non-running states render
/// "Exited".
fn uptime_text(state: &str, started_at: &str, now: DateTime<Utc>) -> String {
    let Ok(started) = DateTime::parse_from_rfc3339(started_at) else {
        return "Unknown".to_string();
    };
    if !state.eq_ignore_ascii_case("running") {
        return "Exited".to_string();
    }

    let elapsed = (now - started.with_timezone(&Utc)).num_seconds().max(0);
    let days = elapsed / 86_400;
    let hours = (elapsed % 86_400) / 3_600;
    let mins = (elapsed % 3_600) / 60;

    if days > 0 {
        format!("Up {days} days")
    } else if hours > 0 {
        format!("Up {hours} hours")
    } else if mins > 0 {
        format!("Up {mins} mins")
    } else {
        "Up < 1 min".to_string()
    }
}

fn ports_summary(raw: &Value) -> String {
    // Inspect shape: NetworkSettings.Ports maps "80/tcp" to a list of host
    // bindings (or null when unpublished).
    if let Some(Value::Object(ports)) = raw
        .get("NetworkSettings")
        .and_then(|settings| settings.get("Ports"))
    {
        let mut entries = Vec::new();
        for (port, bindings) in ports {
            match bindings.as_array().filter(|b| !b.is_empty()) {
                Some(bindings) => {
                    for binding in bindings {
                        match binding.get("HostPort").and_then(Value::as_str) {
                            Some(host_port) => entries.push(format!("{host_port}->{port}")),
                            None => entries.push(port.clone()),
                        }
                    }
                }
                None => entries.push(port.clone()),
            }
        }
        return entries.join(", ");
    }

    // CLI shape: a pre-rendered string, used verbatim.
    raw.get("Ports")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn created_text(raw: &Value) -> String {
    let created = raw
        .get("Created")
        .and_then(Value::as_str)
        .or_else(|| raw.get("CreatedAt").and_then(Value::as_str))
        .unwrap_or("Unknown");
    truncate_created(created)
}

/// Normalize both ISO-8601 ("2024-05-01T10:00:00.123Z") and CLI textual
/// ("2024-05-01 10:00:00 +0000 UTC") timestamps to `YYYY-MM-DD HH:MM:SS`.
fn truncate_created(created: &str) -> String {
    if created.chars().count() > 19 {
        created.replace('T', " ").chars().take(19).collect()
    } else {
        created.to_string()
    }
}

fn labels_of(raw: &Value) -> BTreeMap<String, String> {
    let labels = raw
        .get("Config")
        .and_then(|c| c.get("Labels"))
        .or_else(|| raw.get("Labels"));
    match labels {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
        Some(Value::String(s)) => parse_label_string(s),
        _ => BTreeMap::new(),
    }
}

/// Parse the CLI's `key=value,key2=value2` label string. Segments without a
/// `=` are skipped; one bad segment never aborts the rest.
fn parse_label_string(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|segment| {
            segment
                .split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}
