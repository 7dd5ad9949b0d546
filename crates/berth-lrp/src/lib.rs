//! Long-running processes (LRPs) for berth
//!
//! An LRP is backed by a StatefulSet, an optional private registry secret
//! and, when it runs more than one instance, a PodDisruptionBudget.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod converter;
pub mod desirer;
pub mod pdb;
pub mod probes;
pub mod reconciler;
pub mod status;
pub mod updater;

pub use controller::{error_policy, reconcile, LrpContext};
pub use converter::LrpConverter;
pub use reconciler::{LrpReconciler, LrpWorkload, StatefulSetWorkload};
