//! Well-known label and annotation keys stamped on generated objects
//!
//! Labels carry the machine-queryable identity (used in selectors);
//! annotations carry the human-readable identity.

/// Workload GUID
pub const LABEL_GUID: &str = "workloads.berth.dev/guid";
/// LRP version
pub const LABEL_VERSION: &str = "workloads.berth.dev/version";
/// Owning application GUID
pub const LABEL_APP_GUID: &str = "workloads.berth.dev/app-guid";
/// LRP process type (e.g. "web")
pub const LABEL_PROCESS_TYPE: &str = "workloads.berth.dev/process-type";
/// Workload source type, [`SOURCE_TYPE_APP`] or [`SOURCE_TYPE_TASK`]
pub const LABEL_SOURCE_TYPE: &str = "workloads.berth.dev/source-type";
/// Task name
pub const LABEL_TASK_NAME: &str = "workloads.berth.dev/name";

/// Label the Job controller puts on pods it creates
pub const LABEL_JOB_NAME: &str = "job-name";

/// Application name
pub const ANNOTATION_APP_NAME: &str = "workloads.berth.dev/application-name";
/// Application GUID
pub const ANNOTATION_APP_ID: &str = "workloads.berth.dev/application-id";
/// LRP version
pub const ANNOTATION_VERSION: &str = "workloads.berth.dev/version";
/// Space name
pub const ANNOTATION_SPACE_NAME: &str = "workloads.berth.dev/space-name";
/// Space GUID
pub const ANNOTATION_SPACE_GUID: &str = "workloads.berth.dev/space-guid";
/// Organization name
pub const ANNOTATION_ORG_NAME: &str = "workloads.berth.dev/org-name";
/// Organization GUID
pub const ANNOTATION_ORG_GUID: &str = "workloads.berth.dev/org-guid";
/// LRP process GUID (`<guid>-<version>`)
pub const ANNOTATION_PROCESS_GUID: &str = "workloads.berth.dev/process-guid";
/// Task GUID
pub const ANNOTATION_GUID: &str = "workloads.berth.dev/guid";
/// Name of the container that runs the task inside the job pod
pub const ANNOTATION_TASK_CONTAINER_NAME: &str = "workloads.berth.dev/task-container-name";

/// Source type of LRP objects
pub const SOURCE_TYPE_APP: &str = "APP";
/// Source type of Task objects
pub const SOURCE_TYPE_TASK: &str = "TASK";
