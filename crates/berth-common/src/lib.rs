//! Common types for berth: CRDs, errors, naming and Kubernetes utilities

#![deny(missing_docs)]

pub mod clock;
pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod labels;
pub mod naming;
pub mod retry;
pub mod telemetry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::Error;
pub use kube_utils::ReconcileRequest;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager used for server-side apply and as the event reporter
pub const FIELD_MANAGER: &str = "berth-controller";
