use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Emitter metadata attached to every ingest payload.
///
/// The record is deliberately flat: agents fill in whatever subset applies to
/// them (bare host, cloud VM, container, pod) and leave the rest empty. Empty
/// fields never become labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub agent_id: String,
    pub agent_version: String,
    pub host_id: String,
    pub endpoint_id: String,
    pub hostname: String,
    pub ip_address: String,

    pub os: String,
    pub os_version: String,
    pub platform: String,
    pub platform_family: String,
    pub platform_version: String,
    pub kernel_version: String,
    pub kernel_architecture: String,
    pub architecture: String,
    pub virtualization_system: String,
    pub virtualization_role: String,

    pub cloud_provider: String,
    pub region: String,
    pub availability_zone: String,
    pub instance_id: String,
    pub instance_type: String,
    pub account_id: String,
    pub project_id: String,
    pub resource_group: String,
    pub vm_size: String,
    pub vm_scale_set_name: String,
    pub public_ip: String,
    pub private_ip: String,

    pub container_id: String,
    pub container_name: String,
    pub container_image_id: String,
    pub container_image_name: String,
    pub pod_name: String,
    pub namespace: String,
    pub cluster_name: String,
    pub node_name: String,

    pub application: String,
    pub environment: String,
    pub service: String,
    pub version: String,
    pub deployment_id: String,

    /// User-provided tags (low-cardinality emitter metadata such as env or
    /// team). The label view below is derived from these plus the well-known
    /// fields; nothing is stored twice.
    pub tags: HashMap<String, String>,
}

impl Meta {
    /// Well-known meta fields promoted into the queryable label space, paired
    /// with the label key each is published under.
    fn well_known(&self) -> [(&'static str, &str); 27] {
        [
            ("agent_id", &self.agent_id),
            ("host_id", &self.host_id),
            ("endpoint_id", &self.endpoint_id),
            ("hostname", &self.hostname),
            ("ip", &self.ip_address),
            ("os", &self.os),
            ("platform", &self.platform),
            ("kernel", &self.kernel_version),
            ("architecture", &self.architecture),
            ("virtualization", &self.virtualization_system),
            ("cloud_provider", &self.cloud_provider),
            ("region", &self.region),
            ("availability_zone", &self.availability_zone),
            ("instance_id", &self.instance_id),
            ("account_id", &self.account_id),
            ("project_id", &self.project_id),
            ("container_id", &self.container_id),
            ("container_name", &self.container_name),
            ("pod_name", &self.pod_name),
            ("namespace", &self.namespace),
            ("cluster", &self.cluster_name),
            ("node", &self.node_name),
            ("app", &self.application),
            ("env", &self.environment),
            ("service", &self.service),
            ("version", &self.version),
            ("deployment", &self.deployment_id),
        ]
    }

    /// Single consolidated label space: well-known fields first, user tags
    /// layered on top (a tag wins on key collision). Empty values are skipped.
    pub fn labels(&self) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        for (key, value) in self.well_known() {
            if !value.is_empty() {
                labels.insert(key.to_string(), value.to_string());
            }
        }
        for (key, value) in &self.tags {
            if !value.is_empty() {
                labels.insert(key.clone(), value.clone());
            }
        }
        labels
    }

    /// Whether this emitter is a container workload rather than a bare agent.
    pub fn is_container(&self) -> bool {
        !self.container_id.is_empty() || !self.container_name.is_empty()
    }
}
