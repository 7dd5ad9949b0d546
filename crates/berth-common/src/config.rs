//! Controller configuration loaded from a YAML file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Default service account for workload pods
pub const DEFAULT_APPLICATION_SERVICE_ACCOUNT: &str = "berth-workload";

/// Default seconds a completed task's job is kept before deletion
pub const DEFAULT_TASK_TTL_SECONDS: u64 = 5;

/// Settings shared by the LRP and Task controllers
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Kubeconfig to use; in-cluster or inferred config when unset
    pub kube_config_path: Option<PathBuf>,

    /// Only watch this namespace; all namespaces when unset
    pub workloads_namespace: Option<String>,

    /// Service account workload pods run as
    pub application_service_account: String,

    /// Platform registry secret attached to every workload pod
    pub registry_secret_name: Option<String>,

    /// Leave the service account token mounted in workload pods
    pub unsafe_allow_automount_service_account_token: bool,

    /// Let LRP images run as root
    pub allow_run_image_as_root: bool,

    /// Seconds to keep a completed task's job
    pub task_ttl_seconds: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            kube_config_path: None,
            workloads_namespace: None,
            application_service_account: DEFAULT_APPLICATION_SERVICE_ACCOUNT.to_string(),
            registry_secret_name: None,
            unsafe_allow_automount_service_account_token: false,
            allow_run_image_as_root: false,
            task_ttl_seconds: DEFAULT_TASK_TTL_SECONDS,
        }
    }
}

impl ControllerConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::serialization(format!("failed to unmarshal yaml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; `None` yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    Error::internal_with_context(
                        "load_config",
                        format!("failed to read file {}: {}", path.display(), e),
                    )
                })?;
                Self::from_yaml(&yaml)
            }
        }
    }

    /// Reject settings that cannot produce valid workloads
    pub fn validate(&self) -> Result<(), Error> {
        if self.application_service_account.is_empty() {
            return Err(Error::validation(
                "application_service_account cannot be empty",
            ));
        }
        if let Some(ns) = &self.workloads_namespace {
            if ns.is_empty() {
                return Err(Error::validation("workloads_namespace cannot be empty"));
            }
        }
        Ok(())
    }

    /// Task TTL as a duration
    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_seconds)
    }
}
