//! Resource asks in Kubernetes quantities

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Memory, ephemeral disk and CPU asked for by one container
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceAsk {
    /// Memory in megabytes
    pub memory_mb: i64,
    /// Ephemeral storage in megabytes
    pub disk_mb: i64,
    /// CPU in millicores; no CPU request when zero
    pub cpu_millis: i64,
}

impl ResourceAsk {
    /// Same disk and CPU with a different memory size, as sidecars use
    pub fn with_memory(self, memory_mb: i64) -> Self {
        Self { memory_mb, ..self }
    }
}

fn megabytes(mb: i64) -> Quantity {
    Quantity(format!("{}M", mb))
}

/// Limits and requests for a container
///
/// Memory and disk are both limited and requested at the same size. CPU is
/// only requested, and only when non-zero.
pub fn resource_requirements(ask: ResourceAsk) -> ResourceRequirements {
    let limits = BTreeMap::from([
        ("memory".to_string(), megabytes(ask.memory_mb)),
        ("ephemeral-storage".to_string(), megabytes(ask.disk_mb)),
    ]);

    let mut requests = limits.clone();
    if ask.cpu_millis != 0 {
        requests.insert("cpu".to_string(), Quantity(format!("{}m", ask.cpu_millis)));
    }

    ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
        ..Default::default()
    }
}
