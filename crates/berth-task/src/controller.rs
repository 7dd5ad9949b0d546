//! Task controller entry points

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::error;

use berth_common::clock::SystemClock;
use berth_common::config::ControllerConfig;
use berth_common::crd::Task;
use berth_common::events::KubeEventPublisher;
use berth_common::{Error, ReconcileRequest, FIELD_MANAGER};
use berth_workload::{RegistrySecretProvisioner, SecretsClientImpl};

use crate::client::{JobClient, JobClientImpl, PodClientImpl, TaskClientImpl};
use crate::converter::TaskConverter;
use crate::desirer::JobDesirer;
use crate::reconciler::TaskReconciler;
use crate::status::JobStatusGetter;

/// Delay before a failed Task is reconciled again
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared context for the Task controller
pub struct TaskContext {
    /// Reconciler driving every Task
    pub reconciler: TaskReconciler,
}

impl TaskContext {
    /// Build the production reconciler on top of `client`
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let ttl = config.task_ttl();
        let jobs: Arc<dyn JobClient> = Arc::new(JobClientImpl::new(client.clone()));
        let desirer = JobDesirer::new(
            RegistrySecretProvisioner::new(Arc::new(SecretsClientImpl::new(client.clone()))),
            jobs.clone(),
            TaskConverter::new(config),
        );
        let clock = Arc::new(SystemClock);
        let status = JobStatusGetter::new(Arc::new(PodClientImpl::new(client.clone())), clock.clone());

        Self {
            reconciler: TaskReconciler::new(
                Arc::new(TaskClientImpl::new(client.clone())),
                jobs,
                Arc::new(desirer),
                Arc::new(status),
                Arc::new(KubeEventPublisher::new(client, FIELD_MANAGER)),
                clock,
                ttl,
            ),
        }
    }

    /// Context around an already assembled reconciler
    pub fn from_reconciler(reconciler: TaskReconciler) -> Self {
        Self { reconciler }
    }
}

/// Reconcile a Task resource
pub async fn reconcile(task: Arc<Task>, ctx: Arc<TaskContext>) -> Result<Action, Error> {
    let request = ReconcileRequest::for_object(task.as_ref())?;
    ctx.reconciler.reconcile(&request).await
}

/// Error policy for the Task controller
pub fn error_policy(task: Arc<Task>, error: &Error, _ctx: Arc<TaskContext>) -> Action {
    error!(
        ?error,
        task = %task.name_any(),
        namespace = %task.namespace().unwrap_or_default(),
        "task reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
