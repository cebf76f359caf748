use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A monitored resource: host, container, pod, probe target.
///
/// `parent_id` is a weak reference into the resource id space, never an
/// owning link; hierarchy traversal is a second lookup in the primary index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub display_name: String,
    pub group: String,
    pub parent_id: String,
    pub status: String,

    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub labels: HashMap<String, String>,
    pub tags: HashMap<String, String>,
    pub annotations: HashMap<String, String>,

    pub location: String,
    pub environment: String,
    pub owner: String,
    pub platform: String,
    pub runtime: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub ip_address: String,
    pub resource_type: String,
    pub cluster: String,
    pub namespace: String,

    /// Dirty marker for write-behind persistence; in-memory only.
    #[serde(skip)]
    pub updated: bool,
}

impl Default for Resource {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            kind: String::new(),
            name: String::new(),
            display_name: String::new(),
            group: String::new(),
            parent_id: String::new(),
            status: String::new(),
            first_seen: now,
            last_seen: now,
            created_at: now,
            updated_at: now,
            labels: HashMap::new(),
            tags: HashMap::new(),
            annotations: HashMap::new(),
            location: String::new(),
            environment: String::new(),
            owner: String::new(),
            platform: String::new(),
            runtime: String::new(),
            version: String::new(),
            os: String::new(),
            arch: String::new(),
            ip_address: String::new(),
            resource_type: String::new(),
            cluster: String::new(),
            namespace: String::new(),
            updated: false,
        }
    }
}

impl Resource {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }
}

/// Stable resource id for the host behind an emitter. Every producer of host
/// resources (ingest fan-out, lifecycle tracker) must agree on this mapping.
pub fn host_resource_id(meta: &crate::Meta) -> String {
    let identity = if !meta.host_id.is_empty() {
        &meta.host_id
    } else if !meta.endpoint_id.is_empty() {
        &meta.endpoint_id
    } else {
        &meta.hostname
    };
    format!("host:{identity}")
}

/// Stable resource id for a container emitter.
pub fn container_resource_id(meta: &crate::Meta) -> String {
    let identity = if !meta.container_id.is_empty() {
        &meta.container_id
    } else {
        &meta.container_name
    };
    format!("container:{identity}")
}
