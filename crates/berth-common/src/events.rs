//! Events recorded against workload custom resources
//!
//! Publishing is best effort. A failed event is logged and never fails a
//! reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

use crate::Error;

/// Event reasons, shown in the REASON column of `kubectl get events`
pub mod reasons {
    /// A native object was created for the workload
    pub const CREATED: &str = "Created";
    /// Creating the native object failed
    pub const CREATE_FAILED: &str = "CreateFailed";
    /// A completed task's job was deleted after its TTL
    pub const EXPIRED: &str = "Expired";
}

/// Event actions
pub mod actions {
    /// Creating native objects for a workload
    pub const DESIRE: &str = "Desire";
    /// Deleting a completed task's job
    pub const EXPIRE: &str = "Expire";
}

/// Something that happened to a workload, ready to be recorded
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadEvent {
    /// Normal or Warning
    pub type_: EventType,
    /// One of [`reasons`]
    pub reason: &'static str,
    /// One of [`actions`]
    pub action: &'static str,
    /// Human readable detail
    pub note: String,
}

impl WorkloadEvent {
    /// A native object named `name` of `kind` was created
    pub fn created(kind: &str, name: &str) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reasons::CREATED,
            action: actions::DESIRE,
            note: format!("Created {} {}", kind, name),
        }
    }

    /// Creating native objects failed with `error`
    pub fn create_failed(error: &Error) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reasons::CREATE_FAILED,
            action: actions::DESIRE,
            note: error.to_string(),
        }
    }

    /// The job of a completed task was removed
    pub fn expired(job_name: &str) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reasons::EXPIRED,
            action: actions::EXPIRE,
            note: format!("Deleted job {} after completion", job_name),
        }
    }
}

impl From<WorkloadEvent> for Event {
    fn from(event: WorkloadEvent) -> Self {
        Event {
            type_: event.type_,
            reason: event.reason.to_string(),
            note: Some(event.note),
            action: event.action.to_string(),
            secondary: None,
        }
    }
}

/// Records workload events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record `event` on the object `regarding` points at
    async fn publish(&self, regarding: &ObjectReference, event: WorkloadEvent);
}

/// Publisher backed by the events API
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `reporting_controller` becomes the event's reporting component
    pub fn new(client: Client, reporting_controller: &str) -> Self {
        let reporter = Reporter {
            controller: reporting_controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, regarding: &ObjectReference, event: WorkloadEvent) {
        let reason = event.reason;
        if let Err(e) = self.recorder.publish(&event.into(), regarding).await {
            warn!(
                reason,
                object = ?regarding.name,
                namespace = ?regarding.namespace,
                error = %e,
                "dropping workload event"
            );
        }
    }
}

/// Publisher that drops every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _regarding: &ObjectReference, _event: WorkloadEvent) {}
}
