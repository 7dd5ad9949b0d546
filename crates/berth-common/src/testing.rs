//! Fixtures for tests across the workspace

use chrono::{DateTime, TimeZone, Utc};
use kube::api::ObjectMeta;
use kube::error::ErrorResponse;

use crate::clock::Clock;
use crate::crd::{Healthcheck, Lrp, LrpSpec, PrivateRegistry, Task, TaskSpec};
use crate::Error;

/// API error with the given HTTP code and reason
pub fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} ({})", reason, code),
        reason: reason.to_string(),
        code,
    }))
}

/// 404 from the API server
pub fn not_found() -> Error {
    api_error(404, "NotFound")
}

/// 409 optimistic-concurrency conflict
pub fn conflict() -> Error {
    api_error(409, "Conflict")
}

/// 409 for a create of an existing object
pub fn already_exists() -> Error {
    api_error(409, "AlreadyExists")
}

/// 500 from the API server
pub fn server_error() -> Error {
    api_error(500, "InternalError")
}

/// Instant `secs` seconds after the epoch
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Clock stuck at one instant
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A persisted LRP named `my-lrp` in namespace `apps`
pub fn sample_lrp() -> Lrp {
    let mut lrp = Lrp::new(
        "my-lrp",
        LrpSpec {
            guid: "guid-1234".to_string(),
            version: "version-1234".to_string(),
            process_type: "web".to_string(),
            app_guid: "app-guid".to_string(),
            app_name: "dora".to_string(),
            space_guid: "space-guid".to_string(),
            space_name: "dev".to_string(),
            org_guid: "org-guid".to_string(),
            org_name: "acme".to_string(),
            image: "eirini/dorini".to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), "run".to_string()],
            health: Healthcheck {
                type_: "http".to_string(),
                port: 8080,
                endpoint: "/healthz".to_string(),
                timeout_ms: 3000,
            },
            ports: vec![8080, 9090],
            instances: 2,
            memory_mb: 1024,
            disk_mb: 2048,
            cpu_weight: 2,
            ..Default::default()
        },
    );
    lrp.metadata = persisted("my-lrp", "lrp-uid");
    lrp
}

/// A persisted Task named `my-task` in namespace `apps`
pub fn sample_task() -> Task {
    let mut task = Task::new(
        "my-task",
        TaskSpec {
            guid: "task-guid".to_string(),
            name: "migrate".to_string(),
            image: "eirini/busybox".to_string(),
            command: vec!["/bin/sh".to_string(), "-c".to_string(), "echo hi".to_string()],
            app_name: "dora".to_string(),
            app_guid: "app-guid".to_string(),
            org_name: "acme".to_string(),
            org_guid: "org-guid".to_string(),
            space_name: "dev".to_string(),
            space_guid: "space-guid".to_string(),
            memory_mb: 256,
            disk_mb: 512,
            cpu_millis: 100,
            ..Default::default()
        },
    );
    task.metadata = persisted("my-task", "task-uid");
    task
}

/// Credentials for a private registry
pub fn sample_registry() -> PrivateRegistry {
    PrivateRegistry {
        username: "admin".to_string(),
        password: "hunter2".to_string(),
    }
}

fn persisted(name: &str, uid: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some("apps".to_string()),
        uid: Some(uid.to_string()),
        resource_version: Some("1".to_string()),
        ..Default::default()
    }
}
