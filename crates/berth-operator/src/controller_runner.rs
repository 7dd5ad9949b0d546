//! Controller runner - builds controller futures for each workload kind
//!
//! Each `build_*` function returns a boxed future so the caller decides how
//! to run them.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use berth_common::config::ControllerConfig;
use berth_common::crd::{Lrp, Task};
use berth_lrp::{error_policy as lrp_error_policy, reconcile as lrp_reconcile, LrpContext};
use berth_task::{error_policy as task_error_policy, reconcile as task_reconcile, TaskContext};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller ready to be polled
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Api scoped to the configured workloads namespace, or all namespaces
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Build the LRP controller; it also reacts to changes of owned StatefulSets
pub fn build_lrp_controller(client: Client, config: &ControllerConfig) -> ControllerFuture {
    let namespace = config.workloads_namespace.as_deref();
    let lrps: Api<Lrp> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let ctx = Arc::new(LrpContext::new(client, config.clone()));

    tracing::info!(namespace = ?namespace, "- LRP controller");

    Box::pin(
        Controller::new(lrps, watcher_config())
            .owns(statefulsets, watcher_config())
            .shutdown_on_signal()
            .run(lrp_reconcile, lrp_error_policy, ctx)
            .for_each(log_reconcile_result("LRP")),
    )
}

/// Build the Task controller; it also reacts to changes of owned Jobs
pub fn build_task_controller(client: Client, config: &ControllerConfig) -> ControllerFuture {
    let namespace = config.workloads_namespace.as_deref();
    let tasks: Api<Task> = scoped_api(client.clone(), namespace);
    let jobs: Api<Job> = scoped_api(client.clone(), namespace);
    let ctx = Arc::new(TaskContext::new(client, config.clone()));

    tracing::info!(namespace = ?namespace, ttl_seconds = config.task_ttl_seconds, "- Task controller");

    Box::pin(
        Controller::new(tasks, watcher_config())
            .owns(jobs, watcher_config())
            .shutdown_on_signal()
            .run(task_reconcile, task_error_policy, ctx)
            .for_each(log_reconcile_result("Task")),
    )
}

/// Build every controller the operator runs
pub fn build_controllers(client: Client, config: &ControllerConfig) -> Vec<ControllerFuture> {
    vec![
        build_lrp_controller(client.clone(), config),
        build_task_controller(client, config),
    ]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
