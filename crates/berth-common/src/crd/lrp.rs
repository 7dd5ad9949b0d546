//! LRP CRD types
//!
//! An `LRP` is a long-running, replicated application process. Each LRP
//! identity (GUID + version) is backed by exactly one StatefulSet.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, LocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::PrivateRegistry;
use crate::naming;

// =============================================================================
// Health checks
// =============================================================================

/// How the platform checks an LRP instance is alive
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Healthcheck {
    /// Check type: "http", "port", or anything else for no check
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Port to probe
    #[serde(default)]
    pub port: i32,

    /// HTTP path to probe for "http" checks
    #[serde(default)]
    pub endpoint: String,

    /// Startup grace in milliseconds before liveness checks begin
    #[serde(rename = "timeoutMs", default)]
    pub timeout_ms: u64,
}

/// Parsed form of [`Healthcheck::type_`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthcheckKind {
    /// HTTP GET against `endpoint:port`
    Http,
    /// TCP connect to `port`
    Port,
    /// No probe
    None,
}

impl Healthcheck {
    /// Parse the check type
    pub fn kind(&self) -> HealthcheckKind {
        match self.type_.as_str() {
            "http" => HealthcheckKind::Http,
            "port" => HealthcheckKind::Port,
            _ => HealthcheckKind::None,
        }
    }
}

// =============================================================================
// Sidecars and volumes
// =============================================================================

/// Extra container that runs next to the application container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    /// Container name
    pub name: String,

    /// Command to run
    #[serde(default)]
    pub command: Vec<String>,

    /// Memory limit in megabytes
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: i64,

    /// Plain environment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// A persistent volume claim mounted into the application container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimMount {
    /// Name of the PersistentVolumeClaim
    pub claim_name: String,
    /// Mount path inside the container
    pub mount_path: String,
}

// =============================================================================
// CRD
// =============================================================================

/// Long-running process specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "berth.dev",
    version = "v1",
    kind = "LRP",
    root = "Lrp",
    plural = "lrps",
    shortname = "lrp",
    namespaced,
    status = "LrpStatus",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".status.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LrpSpec {
    /// Process GUID, stable across versions
    #[serde(rename = "GUID")]
    pub guid: String,

    /// Version of this process; GUID + version is the LRP identity
    pub version: String,

    /// Process type (e.g. "web", "worker")
    #[serde(default)]
    pub process_type: String,

    /// Owning application GUID
    #[serde(rename = "appGUID", default)]
    pub app_guid: String,

    /// Owning application name
    #[serde(default)]
    pub app_name: String,

    /// Space GUID
    #[serde(rename = "spaceGUID", default)]
    pub space_guid: String,

    /// Space name
    #[serde(default)]
    pub space_name: String,

    /// Organization GUID
    #[serde(rename = "orgGUID", default)]
    pub org_guid: String,

    /// Organization name
    #[serde(default)]
    pub org_name: String,

    /// Container image
    pub image: String,

    /// Command to run
    #[serde(default)]
    pub command: Vec<String>,

    /// Sidecar containers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sidecars: Vec<Sidecar>,

    /// Credentials for a private image registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_registry: Option<PrivateRegistry>,

    /// Plain environment (superseded by `environment` on name clashes)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Structured environment, may reference secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,

    /// Health check
    #[serde(default)]
    pub health: Healthcheck,

    /// Container ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<i32>,

    /// Desired number of instances
    #[serde(default)]
    pub instances: i32,

    /// Memory limit in megabytes
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: i64,

    /// Ephemeral disk limit in megabytes
    #[serde(rename = "diskMB", default)]
    pub disk_mb: i64,

    /// Relative CPU weight; requested as `cpuWeight * 10` millicores
    #[serde(default)]
    pub cpu_weight: i64,

    /// Persistent volume claims to mount
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeClaimMount>,

    /// Annotations copied onto every pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub user_defined_annotations: BTreeMap<String, String>,

    /// Extra image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl LrpSpec {
    /// Name of the StatefulSet backing this identity
    pub fn statefulset_name(&self) -> String {
        naming::statefulset_name(&self.guid, &self.version, &self.app_name, &self.space_name)
    }

    /// Value of the process-guid annotation
    pub fn process_guid(&self) -> String {
        format!("{}-{}", self.guid, self.version)
    }

    /// CPU request in millicores
    pub fn cpu_millis(&self) -> i64 {
        self.cpu_weight * 10
    }
}

/// Observed state of an LRP
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LrpStatus {
    /// Ready replicas of the backing StatefulSet
    #[serde(default)]
    pub replicas: i32,
}
