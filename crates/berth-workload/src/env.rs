//! Container environment
//!
//! Three sources are merged, later ones shadowing earlier ones by name:
//! platform-injected variables, the plain `env` map, then structured
//! `environment` entries (which may reference secrets).

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector};

/// Pod name
pub const ENV_POD_NAME: &str = "POD_NAME";
/// Pod UID, unique per instance
pub const ENV_INSTANCE_GUID: &str = "CF_INSTANCE_GUID";
/// Pod IP
pub const ENV_INSTANCE_INTERNAL_IP: &str = "CF_INSTANCE_INTERNAL_IP";
/// Node IP
pub const ENV_INSTANCE_IP: &str = "CF_INSTANCE_IP";
/// `host:port` the instance listens on
pub const ENV_INSTANCE_ADDR: &str = "CF_INSTANCE_ADDR";
/// Port the instance listens on
pub const ENV_INSTANCE_PORT: &str = "CF_INSTANCE_PORT";
/// JSON list of port mappings
pub const ENV_INSTANCE_PORTS: &str = "CF_INSTANCE_PORTS";

/// A literal variable
pub fn literal(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn field_ref(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: None,
                field_path: field_path.to_string(),
            }),
            ..Default::default()
        }),
    }
}

/// Variables identifying the running instance, resolved by the kubelet
pub fn identity_env() -> Vec<EnvVar> {
    vec![
        field_ref(ENV_POD_NAME, "metadata.name"),
        field_ref(ENV_INSTANCE_GUID, "metadata.uid"),
        field_ref(ENV_INSTANCE_INTERNAL_IP, "status.podIP"),
        field_ref(ENV_INSTANCE_IP, "status.hostIP"),
    ]
}

/// Port variables for a task, which listens on nothing
pub fn task_port_env() -> Vec<EnvVar> {
    vec![
        literal(ENV_INSTANCE_ADDR, ""),
        literal(ENV_INSTANCE_PORT, ""),
        literal(ENV_INSTANCE_PORTS, "[]"),
    ]
}

/// Port variables for an LRP, describing its first port
pub fn lrp_port_env(ports: &[i32]) -> Vec<EnvVar> {
    match ports.first() {
        None => Vec::new(),
        Some(port) => vec![
            literal(ENV_INSTANCE_ADDR, format!("0.0.0.0:{}", port)),
            literal(ENV_INSTANCE_PORT, port.to_string()),
            literal(
                ENV_INSTANCE_PORTS,
                serde_json::json!([{ "external": port, "internal": port }]).to_string(),
            ),
        ],
    }
}

/// Plain name/value pairs as env vars
pub fn plain_env(env: &BTreeMap<String, String>) -> Vec<EnvVar> {
    env.iter().map(|(name, value)| literal(name, value.clone())).collect()
}

/// Merge env layers; a later layer wins on a name clash
///
/// The result is sorted by name so identical inputs render identically.
pub fn merge_env<I>(layers: I) -> Vec<EnvVar>
where
    I: IntoIterator<Item = Vec<EnvVar>>,
{
    let mut merged: BTreeMap<String, EnvVar> = BTreeMap::new();
    for var in layers.into_iter().flatten() {
        merged.insert(var.name.clone(), var);
    }
    merged.into_values().collect()
}

/// Full environment for a primary container
pub fn container_env(
    platform: Vec<EnvVar>,
    plain: &BTreeMap<String, String>,
    structured: &[EnvVar],
) -> Vec<EnvVar> {
    merge_env([platform, plain_env(plain), structured.to_vec()])
}
