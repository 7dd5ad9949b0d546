//! Task to Job conversion
//!
//! Jobs run their pod exactly once: the pod never restarts and the job never
//! retries. Failures surface as task conditions instead.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec, Secret};
use kube::api::ObjectMeta;
use kube::ResourceExt;

use berth_common::config::ControllerConfig;
use berth_common::crd::{Task, TaskSpec};
use berth_common::labels;
use berth_workload::env;
use berth_workload::pod::{image_pull_secrets, IdentityAnnotations};
use berth_workload::resources::{resource_requirements, ResourceAsk};
use berth_workload::security::{
    automount_service_account_token, container_security_context, pod_security_context,
};

/// Name of the container running the task
pub const TASK_CONTAINER_NAME: &str = "opi-task";

const RESTART_POLICY_NEVER: &str = "Never";

fn pod_labels(spec: &TaskSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::LABEL_APP_GUID.to_string(), spec.app_guid.clone()),
        (labels::LABEL_GUID.to_string(), spec.guid.clone()),
        (
            labels::LABEL_SOURCE_TYPE.to_string(),
            labels::SOURCE_TYPE_TASK.to_string(),
        ),
    ])
}

fn identity_annotations(spec: &TaskSpec) -> BTreeMap<String, String> {
    IdentityAnnotations {
        app_name: &spec.app_name,
        app_guid: &spec.app_guid,
        org_name: &spec.org_name,
        org_guid: &spec.org_guid,
        space_name: &spec.space_name,
        space_guid: &spec.space_guid,
    }
    .to_map()
}

/// Builds Jobs for Tasks
#[derive(Clone, Debug)]
pub struct TaskConverter {
    config: ControllerConfig,
}

impl TaskConverter {
    /// Create a converter using the controller's workload settings
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    /// Build the Job running `task`
    pub fn convert(&self, task: &Task, private_registry_secret: Option<&Secret>) -> Job {
        let spec = &task.spec;

        let mut job_labels = pod_labels(spec);
        job_labels.insert(labels::LABEL_TASK_NAME.to_string(), spec.name.clone());

        let mut pod_annotations = identity_annotations(spec);
        pod_annotations.insert(
            labels::ANNOTATION_TASK_CONTAINER_NAME.to_string(),
            TASK_CONTAINER_NAME.to_string(),
        );
        pod_annotations.insert(labels::ANNOTATION_GUID.to_string(), spec.guid.clone());

        let secret_name = private_registry_secret.map(|s| s.name_any());

        Job {
            metadata: ObjectMeta {
                name: Some(spec.job_name()),
                namespace: task.namespace(),
                labels: Some(job_labels),
                annotations: Some(identity_annotations(spec)),
                ..Default::default()
            },
            spec: Some(JobSpec {
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels(spec)),
                        annotations: Some(pod_annotations),
                        ..Default::default()
                    }),
                    spec: Some(self.pod_spec(spec, secret_name.as_deref())),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn pod_spec(&self, spec: &TaskSpec, private_registry_secret: Option<&str>) -> PodSpec {
        let container = Container {
            name: TASK_CONTAINER_NAME.to_string(),
            image: Some(spec.image.clone()),
            image_pull_policy: Some("Always".to_string()),
            command: Some(spec.command.clone()),
            env: Some(env::container_env(
                env::merge_env([env::identity_env(), env::task_port_env()]),
                &spec.env,
                &spec.environment,
            )),
            resources: Some(resource_requirements(ResourceAsk {
                memory_mb: spec.memory_mb,
                disk_mb: spec.disk_mb,
                cpu_millis: spec.cpu_millis,
            })),
            security_context: Some(container_security_context(false)),
            ..Default::default()
        };

        PodSpec {
            containers: vec![container],
            restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
            image_pull_secrets: image_pull_secrets(
                &self.config,
                private_registry_secret,
                &spec.image_pull_secrets,
            ),
            service_account_name: Some(self.config.application_service_account.clone()),
            automount_service_account_token: automount_service_account_token(&self.config),
            security_context: pod_security_context(false),
            ..Default::default()
        }
    }
}
