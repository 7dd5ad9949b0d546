//! Task conditions derived from the backing Job
//!
//! Conditions are emitted in lifecycle order. A failed job needs one extra
//! lookup: the exit code and reason live on the task container of the job's
//! only pod.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobStatus};
use k8s_openapi::api::core::v1::ContainerStateTerminated;
use kube::ResourceExt;
use tracing::error;

#[cfg(test)]
use mockall::automock;

use berth_common::clock::Clock;
use berth_common::crd::{condition_types, Condition};
use berth_common::labels::ANNOTATION_TASK_CONTAINER_NAME;
use berth_common::Error;

use crate::client::PodClient;

const JOB_FAILED: &str = "Failed";

/// Computes task conditions for a job
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskStatusGetter: Send + Sync {
    /// Conditions describing where `job` is in its lifecycle
    async fn get_status_conditions(&self, job: &Job) -> Result<Vec<Condition>, Error>;
}

/// [`TaskStatusGetter`] reading job status and, on failure, its pod
pub struct JobStatusGetter {
    pods: Arc<dyn PodClient>,
    clock: Arc<dyn Clock>,
}

impl JobStatusGetter {
    /// Create a status getter
    pub fn new(pods: Arc<dyn PodClient>, clock: Arc<dyn Clock>) -> Self {
        Self { pods, clock }
    }

    async fn failed_container_state(&self, job: &Job) -> Result<ContainerStateTerminated, Error> {
        let namespace = job.namespace().unwrap_or_default();
        let name = job.name_any();
        let mut pods = self.pods.list_by_job(&namespace, &name).await?;

        let pod = match pods.len() {
            0 => {
                return Err(Error::inconsistent(format!(
                    "no pods found for job {}:{}",
                    namespace, name
                )))
            }
            1 => pods.remove(0),
            _ => {
                return Err(Error::inconsistent(format!(
                    "found more than one pod for job {}:{}",
                    namespace, name
                )))
            }
        };

        let container_name = pod
            .annotations()
            .get(ANNOTATION_TASK_CONTAINER_NAME)
            .cloned()
            .unwrap_or_default();
        let status = pod
            .status
            .and_then(|s| s.container_statuses)
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.name == container_name)
            .ok_or_else(|| {
                Error::inconsistent(format!("no task container found for job {}:{}", namespace, name))
            })?;

        status
            .state
            .and_then(|s| s.terminated)
            .ok_or_else(|| {
                Error::inconsistent(format!(
                    "no terminated state found for job {}:{}",
                    namespace, name
                ))
            })
    }
}

/// Transition time of the most recent `Failed` condition on the job
fn last_failure_time(status: &JobStatus) -> Option<DateTime<Utc>> {
    status
        .conditions
        .iter()
        .flatten()
        .filter(|c| c.type_ == JOB_FAILED)
        .filter_map(|c| c.last_transition_time.as_ref().map(|t| t.0))
        .max()
}

#[async_trait]
impl TaskStatusGetter for JobStatusGetter {
    async fn get_status_conditions(&self, job: &Job) -> Result<Vec<Condition>, Error> {
        let created_at = job
            .metadata
            .creation_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_else(|| self.clock.now());
        let mut conditions = vec![Condition::truthy(
            condition_types::INITIALIZED,
            "job_created",
            "Job created",
            created_at,
        )];

        let status = job.status.clone().unwrap_or_default();
        let Some(started_at) = status.start_time.as_ref().map(|t| t.0) else {
            return Ok(conditions);
        };
        conditions.push(Condition::truthy(
            condition_types::STARTED,
            "job_started",
            "Job started",
            started_at,
        ));

        if status.succeeded.unwrap_or(0) > 0 {
            if let Some(completed_at) = status.completion_time.as_ref().map(|t| t.0) {
                conditions.push(Condition::truthy(
                    condition_types::SUCCEEDED,
                    "job_succeeded",
                    "Job succeeded",
                    completed_at,
                ));
            }
        }

        if status.failed.unwrap_or(0) > 0 {
            if let Some(failed_at) = last_failure_time(&status) {
                let terminated = match self.failed_container_state(job).await {
                    Ok(terminated) => terminated,
                    Err(e) => {
                        error!(job = %job.name_any(), error = %e, "failed to get container status");
                        return Err(e.wrap("failed to get container status"));
                    }
                };
                conditions.push(Condition::truthy(
                    condition_types::FAILED,
                    terminated.reason.unwrap_or_default(),
                    format!("Failed with exit code: {}", terminated.exit_code),
                    failed_at,
                ));
            }
        }

        Ok(conditions)
    }
}
