//! One-shot tasks for berth
//!
//! A Task is backed by a Job that runs its pod once. Conditions on the Task
//! mirror the Job's progress, and the Job is deleted a fixed time after the
//! Task completes.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod converter;
pub mod desirer;
pub mod reconciler;
pub mod status;

pub use controller::{error_policy, reconcile, TaskContext};
pub use converter::TaskConverter;
pub use reconciler::{TaskReconciler, TaskState};
