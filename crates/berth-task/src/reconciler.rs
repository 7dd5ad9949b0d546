//! Task reconciliation
//!
//! A task runs at most once. Until it reaches a terminal condition its job is
//! desired and its conditions are refreshed from the job. Once terminal, the
//! job is kept for the configured TTL and then deleted; the task is never
//! desired again.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::Action;
use kube::Resource;
use tracing::{debug, info};

use berth_common::clock::Clock;
use berth_common::crd::{set_condition, Condition, Task};
use berth_common::error::ErrorContext;
use berth_common::events::{EventPublisher, WorkloadEvent};
use berth_common::{Error, ReconcileRequest};

use crate::client::{JobClient, TaskClient};
use crate::desirer::TaskDesirer;
use crate::status::TaskStatusGetter;

/// Where a live task is in its lifecycle
#[derive(Clone, Debug, PartialEq)]
pub enum TaskState {
    /// Succeeded or failed; carries the terminal condition
    Completed(Condition),
    /// Not terminal and no job exists yet
    AbsentJob,
    /// Not terminal and its job exists
    PresentJob(Box<Job>),
}

/// Converges Tasks onto Jobs
pub struct TaskReconciler {
    tasks: Arc<dyn TaskClient>,
    jobs: Arc<dyn JobClient>,
    desirer: Arc<dyn TaskDesirer>,
    status: Arc<dyn TaskStatusGetter>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TaskReconciler {
    /// Create a reconciler from its collaborators
    ///
    /// Completed tasks keep their job for `ttl`.
    pub fn new(
        tasks: Arc<dyn TaskClient>,
        jobs: Arc<dyn JobClient>,
        desirer: Arc<dyn TaskDesirer>,
        status: Arc<dyn TaskStatusGetter>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            tasks,
            jobs,
            desirer,
            status,
            events,
            clock,
            ttl,
        }
    }

    /// Reconcile the task named by `request`
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<Action, Error> {
        let Some(task) = self
            .tasks
            .get(&request.namespace, &request.name)
            .await
            .context("could not fetch task")?
        else {
            debug!(task = %request, "task not found");
            return Ok(Action::await_change());
        };

        match self.observe(&task).await? {
            TaskState::Completed(terminal) => self.expire(&task, &terminal).await,
            TaskState::AbsentJob => {
                debug!(task = %request, "desiring task");
                let job = self
                    .desirer
                    .desire(&task)
                    .await
                    .context("failed to desire task")?;
                self.publish_created(&task, &job).await;
                self.refresh_status(&task, &job).await
            }
            TaskState::PresentJob(job) => self.refresh_status(&task, &job).await,
        }
    }

    /// Classify `task` using its own conditions and, if needed, its job
    pub async fn observe(&self, task: &Task) -> Result<TaskState, Error> {
        if let Some(terminal) = task.terminal_condition() {
            return Ok(TaskState::Completed(terminal.clone()));
        }

        let namespace = task.meta().namespace.clone().unwrap_or_default();
        let job = self
            .jobs
            .get(&namespace, &task.spec.job_name())
            .await
            .context("failed to get job")?;

        Ok(match job {
            Some(job) => TaskState::PresentJob(Box::new(job)),
            None => TaskState::AbsentJob,
        })
    }

    /// Time left before a task that completed at `terminal` expires
    fn remaining_ttl(&self, terminal: &Condition) -> Option<Duration> {
        let elapsed = self
            .clock
            .since(terminal.last_transition_time)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.ttl.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    async fn expire(&self, task: &Task, terminal: &Condition) -> Result<Action, Error> {
        if let Some(remaining) = self.remaining_ttl(terminal) {
            debug!(task = %task.spec.job_name(), remaining = ?remaining, "task completed, job not yet expired");
            return Ok(Action::requeue(remaining));
        }

        let namespace = task.meta().namespace.clone().unwrap_or_default();
        let job_name = task.spec.job_name();
        let deleted = self
            .jobs
            .delete(&namespace, &job_name)
            .await
            .context("failed to delete job")?;

        if deleted {
            info!(job = %job_name, namespace = %namespace, "deleted expired job");
            self.events
                .publish(&task.object_ref(&()), WorkloadEvent::expired(&job_name))
                .await;
        }
        Ok(Action::await_change())
    }

    async fn publish_created(&self, task: &Task, job: &Job) {
        let job_name = job.meta().name.clone().unwrap_or_else(|| task.spec.job_name());
        info!(job = %job_name, "desired task");
        self.events
            .publish(&task.object_ref(&()), WorkloadEvent::created("job", &job_name))
            .await;
    }

    /// Write the job's conditions onto the task
    ///
    /// A task that turns terminal here is revisited after the TTL so its job
    /// gets deleted without further events.
    async fn refresh_status(&self, task: &Task, job: &Job) -> Result<Action, Error> {
        let conditions = self
            .status
            .get_status_conditions(job)
            .await
            .context("failed to update task status")?;

        let mut modified = task.clone();
        let status = modified.status.get_or_insert_with(Default::default);
        for condition in conditions {
            set_condition(&mut status.conditions, condition);
        }

        self.tasks
            .patch_status(task, &modified)
            .await
            .context("failed to update task status")?;

        if modified.terminal_condition().is_some() {
            debug!(task = %task.spec.job_name(), ttl = ?self.ttl, "task completed, queueing job deletion");
            return Ok(Action::requeue(self.ttl));
        }
        Ok(Action::await_change())
    }
}
