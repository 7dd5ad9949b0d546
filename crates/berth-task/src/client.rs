//! Kubernetes access needed by the Task controller

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use berth_common::crd::Task;
use berth_common::kube_utils::json_patch_from;
use berth_common::labels::LABEL_JOB_NAME;
use berth_common::{Error, FIELD_MANAGER};

/// Job operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Create a job in its own namespace
    async fn create(&self, job: &Job) -> Result<Job, Error>;

    /// Get a job by name, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error>;

    /// Delete a job and its pods
    ///
    /// Returns `false` if the job was already gone.
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error>;
}

/// Pod lookups
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodClient: Send + Sync {
    /// Pods created by the named job
    async fn list_by_job(&self, namespace: &str, job_name: &str) -> Result<Vec<Pod>, Error>;
}

/// Task custom resource operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Get a task, `None` if it was deleted
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Task>, Error>;

    /// Patch the status subresource with the difference between two copies
    async fn patch_status(&self, original: &Task, modified: &Task) -> Result<(), Error>;
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::validation(format!("{} has no namespace", obj.name_any())))
}

/// Real Kubernetes client implementation
pub struct JobClientImpl {
    client: Client,
}

impl JobClientImpl {
    /// Create a new JobClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JobClient for JobClientImpl {
    async fn create(&self, job: &Job) -> Result<Job, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &namespace_of(job)?);
        let params = PostParams {
            dry_run: false,
            field_manager: Some(FIELD_MANAGER.to_string()),
        };
        Ok(api.create(&params, job).await?)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(job) => Ok(Some(job)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(job = %name, namespace = %namespace, "job already deleted");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Real Kubernetes client implementation
pub struct PodClientImpl {
    client: Client,
}

impl PodClientImpl {
    /// Create a new PodClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodClient for PodClientImpl {
    async fn list_by_job(&self, namespace: &str, job_name: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{}={}", LABEL_JOB_NAME, job_name);
        Ok(api
            .list(&ListParams::default().labels(&selector))
            .await?
            .items)
    }
}

/// Real Kubernetes client implementation
pub struct TaskClientImpl {
    client: Client,
}

impl TaskClientImpl {
    /// Create a new TaskClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskClient for TaskClientImpl {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Task>, Error> {
        let api: Api<Task> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(task) => Ok(Some(task)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(&self, original: &Task, modified: &Task) -> Result<(), Error> {
        let Some(patch) = json_patch_from(original, modified)? else {
            debug!(task = %original.name_any(), "task status unchanged");
            return Ok(());
        };
        let api: Api<Task> = Api::namespaced(self.client.clone(), &namespace_of(original)?);
        api.patch_status(
            &original.name_any(),
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::<()>::Json(patch),
        )
        .await?;
        Ok(())
    }
}
