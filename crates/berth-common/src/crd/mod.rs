//! Custom Resource Definitions for berth
//!
//! This module contains the workload CRDs reconciled by the berth operator.

mod lrp;
mod task;
mod types;

pub use lrp::{
    Healthcheck, HealthcheckKind, Lrp, LrpSpec, LrpStatus, Sidecar, VolumeClaimMount,
};
pub use task::{condition_types, Task, TaskSpec, TaskStatus};
pub use types::{
    find_condition, is_condition_true, set_condition, Condition, ConditionStatus, PrivateRegistry,
};
