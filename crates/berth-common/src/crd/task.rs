//! Task CRD types
//!
//! A `Task` runs a single command to completion, at most once. Its status is
//! an ordered set of conditions derived from the backing Job.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, LocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{find_condition, is_condition_true, Condition, PrivateRegistry};
use crate::naming;

/// Condition types reported on a Task
pub mod condition_types {
    /// The backing job was created
    pub const INITIALIZED: &str = "Initialized";
    /// The backing job started running
    pub const STARTED: &str = "Started";
    /// The task completed successfully
    pub const SUCCEEDED: &str = "Succeeded";
    /// The task failed
    pub const FAILED: &str = "Failed";
}

/// One-shot task specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "berth.dev",
    version = "v1",
    kind = "Task",
    plural = "tasks",
    namespaced,
    status = "TaskStatus",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Task GUID
    #[serde(rename = "GUID")]
    pub guid: String,

    /// Task name, appended to the job name
    #[serde(default)]
    pub name: String,

    /// Container image
    pub image: String,

    /// Credentials for a private image registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_registry: Option<PrivateRegistry>,

    /// Plain environment (superseded by `environment` on name clashes)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Structured environment, may reference secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<EnvVar>,

    /// Command to run
    #[serde(default)]
    pub command: Vec<String>,

    /// Owning application name
    #[serde(default)]
    pub app_name: String,

    /// Owning application GUID
    #[serde(rename = "appGUID", default)]
    pub app_guid: String,

    /// Organization name
    #[serde(default)]
    pub org_name: String,

    /// Organization GUID
    #[serde(rename = "orgGUID", default)]
    pub org_guid: String,

    /// Space name
    #[serde(default)]
    pub space_name: String,

    /// Space GUID
    #[serde(rename = "spaceGUID", default)]
    pub space_guid: String,

    /// Memory limit in megabytes
    #[serde(rename = "memoryMB", default)]
    pub memory_mb: i64,

    /// Ephemeral disk limit in megabytes
    #[serde(rename = "diskMB", default)]
    pub disk_mb: i64,

    /// CPU request in millicores
    #[serde(default)]
    pub cpu_millis: i64,

    /// Extra image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl TaskSpec {
    /// Name of the Job backing this task
    pub fn job_name(&self) -> String {
        naming::job_name(&self.guid, &self.name, &self.app_name, &self.space_name)
    }

    /// Credentials to use for the image, if complete
    pub fn registry_credentials(&self) -> Option<&PrivateRegistry> {
        self.private_registry
            .as_ref()
            .filter(|registry| registry.is_complete())
    }
}

/// Observed state of a Task
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    /// Lifecycle conditions, at most one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl TaskStatus {
    /// The terminal condition, Succeeded taking precedence over Failed
    pub fn terminal_condition(&self) -> Option<&Condition> {
        [condition_types::SUCCEEDED, condition_types::FAILED]
            .into_iter()
            .filter(|type_| is_condition_true(&self.conditions, type_))
            .find_map(|type_| find_condition(&self.conditions, type_))
    }

    /// True once the task succeeded or failed
    pub fn is_completed(&self) -> bool {
        self.terminal_condition().is_some()
    }
}

impl Task {
    /// Terminal condition of the task, if it has completed
    pub fn terminal_condition(&self) -> Option<&Condition> {
        self.status.as_ref().and_then(TaskStatus::terminal_condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::types::ConditionStatus;
    use chrono::{TimeZone, Utc};

    fn condition(type_: &str, status: ConditionStatus, secs: i64) -> Condition {
        Condition::new(
            type_,
            status,
            "reason",
            "message",
            Utc.timestamp_opt(secs, 0).single().expect("valid timestamp"),
        )
    }

    mod completion {
        use super::*;

        #[test]
        fn running_task_is_not_completed() {
            let status = TaskStatus {
                conditions: vec![
                    condition(condition_types::INITIALIZED, ConditionStatus::True, 1),
                    condition(condition_types::STARTED, ConditionStatus::True, 2),
                ],
            };
            assert!(!status.is_completed());
        }

        #[test]
        fn succeeded_wins_over_failed() {
            let status = TaskStatus {
                conditions: vec![
                    condition(condition_types::FAILED, ConditionStatus::True, 5),
                    condition(condition_types::SUCCEEDED, ConditionStatus::True, 9),
                ],
            };
            let terminal = status.terminal_condition().expect("terminal condition");
            assert_eq!(terminal.type_, condition_types::SUCCEEDED);
        }

        #[test]
        fn false_terminal_conditions_do_not_count() {
            let status = TaskStatus {
                conditions: vec![condition(condition_types::FAILED, ConditionStatus::False, 5)],
            };
            assert!(!status.is_completed());
        }

        #[test]
        fn failed_task_is_completed() {
            let status = TaskStatus {
                conditions: vec![condition(condition_types::FAILED, ConditionStatus::True, 5)],
            };
            assert!(status.is_completed());
        }
    }

    #[test]
    fn registry_credentials_require_username_and_password() {
        let mut spec = TaskSpec {
            private_registry: Some(PrivateRegistry {
                username: "user".to_string(),
                password: String::new(),
            }),
            ..Default::default()
        };
        assert!(spec.registry_credentials().is_none());

        spec.private_registry = Some(PrivateRegistry {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        assert!(spec.registry_credentials().is_some());
    }

    #[test]
    fn job_name_follows_naming_rules() {
        let spec = TaskSpec {
            guid: "task-123".to_string(),
            name: "task-name".to_string(),
            app_name: "my-app".to_string(),
            space_name: "my-space".to_string(),
            ..Default::default()
        };
        assert_eq!(spec.job_name(), "my-app-my-space-task-name");
    }
}
