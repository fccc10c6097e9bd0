//! In-memory host registry, optionally seeded from a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use tracing::{info, warn};

use dockhand_common::{DockhandError, HostDescriptor, Result};

/// Named host descriptors, keyed by host name. Names are unique; a second
/// registration under the same name replaces the first.
#[derive(Default)]
pub struct HostRegistry {
    hosts: Mutex<HashMap<String, HostDescriptor>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a JSON array of host descriptors.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let hosts: Vec<HostDescriptor> = serde_json::from_str(&raw)
            .map_err(|e| DockhandError::Parse(format!("host file: {e}")))?;

        let registry = Self::new();
        for host in hosts {
            registry.register(host);
        }
        info!(
            path = %path.as_ref().display(),
            count = registry.len(),
            "loaded host registry"
        );
        Ok(registry)
    }

    pub fn register(&self, host: HostDescriptor) {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        if hosts.insert(host.name.clone(), host.clone()).is_some() {
            warn!(host = %host.name, "replacing existing host registration");
        } else {
            info!(host = %host.name, kind = ?host.kind, "registered host");
        }
    }

    pub fn get(&self, name: &str) -> Option<HostDescriptor> {
        self.hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn remove(&self, name: &str) -> Option<HostDescriptor> {
        self.hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Snapshot of all hosts, sorted by name for stable output.
    pub fn list(&self) -> Vec<HostDescriptor> {
        let mut hosts: Vec<_> = self
            .hosts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        hosts.sort_by(|a, b| a.name.cmp(&b.name));
        hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
