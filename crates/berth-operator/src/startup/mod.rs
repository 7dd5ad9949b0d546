//! Startup utilities for the berth operator

mod crds;

pub use crds::{crds_yaml, ensure_crds_installed, workload_crds, CrdDef};
