//! Job creation for tasks

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use berth_common::crd::Task;
use berth_common::error::{CombinedError, ErrorContext};
use berth_common::kube_utils::set_controller_reference;
use berth_common::Error;
use berth_workload::RegistrySecretProvisioner;

use crate::client::JobClient;
use crate::converter::TaskConverter;

/// Creates the Job running a task
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskDesirer: Send + Sync {
    /// Create the job for `task` and return it as stored
    async fn desire(&self, task: &Task) -> Result<Job, Error>;
}

/// [`TaskDesirer`] that provisions a registry secret when the task needs one
pub struct JobDesirer {
    secrets: RegistrySecretProvisioner,
    jobs: Arc<dyn JobClient>,
    converter: TaskConverter,
}

impl JobDesirer {
    /// Create a desirer from its collaborators
    pub fn new(
        secrets: RegistrySecretProvisioner,
        jobs: Arc<dyn JobClient>,
        converter: TaskConverter,
    ) -> Self {
        Self {
            secrets,
            jobs,
            converter,
        }
    }

    async fn cleanup_and_error(&self, error: Error, secret: Option<&Secret>) -> Error {
        let Some(secret) = secret else {
            return error;
        };
        match self.secrets.cleanup(secret).await {
            Ok(()) => error,
            Err(cleanup) => Error::Combined(CombinedError::new(
                error,
                cleanup.wrap("failed to cleanup registry secret"),
            )),
        }
    }

    async fn existing_job(&self, namespace: &str, name: &str) -> Result<Job, Error> {
        self.jobs
            .get(namespace, name)
            .await?
            .ok_or_else(|| Error::not_found("Job", format!("{}/{}", namespace, name)))
    }
}

#[async_trait]
impl TaskDesirer for JobDesirer {
    async fn desire(&self, task: &Task) -> Result<Job, Error> {
        let namespace = task
            .namespace()
            .ok_or_else(|| Error::validation(format!("task {} has no namespace", task.name_any())))?;

        let secret = match task.spec.registry_credentials() {
            Some(registry) => Some(
                self.secrets
                    .provision(&namespace, &task.spec.image, registry)
                    .await
                    .context("failed to create task secret")?,
            ),
            None => None,
        };

        let mut job = self.converter.convert(task, secret.as_ref());
        job.metadata.namespace = Some(namespace.clone());
        let job_name = job.name_any();
        if let Err(e) = set_controller_reference(task, &mut job) {
            return Err(self
                .cleanup_and_error(e.wrap("failed to set controller reference"), secret.as_ref())
                .await);
        }

        let created = match self.jobs.create(&job).await {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => {
                debug!(job = %job_name, namespace = %namespace, "job already exists");
                if let Some(secret) = &secret {
                    if let Err(e) = self.secrets.cleanup(secret).await {
                        warn!(secret = %secret.name_any(), error = %e, "failed to cleanup unused registry secret");
                    }
                }
                return self
                    .existing_job(&namespace, &job_name)
                    .await
                    .context("failed to get existing job");
            }
            Err(e) => {
                return Err(self
                    .cleanup_and_error(e.wrap("failed to create job"), secret.as_ref())
                    .await)
            }
        };
        info!(job = %job_name, namespace = %namespace, "created job");

        if let Some(secret) = &secret {
            self.secrets
                .adopt(secret, &created)
                .await
                .context("failed to set secret ownership")?;
        }

        Ok(created)
    }
}
