//! Building blocks shared by the LRP and Task converters
//!
//! - **Environment**: instance identity variables and the env merge order
//! - **Resources**: memory, disk and CPU asks in Kubernetes quantities
//! - **Security**: the restrictive container and pod security settings
//! - **Registry**: private registry credentials as a dockerconfigjson Secret,
//!   and the [`secrets::RegistrySecretProvisioner`] that owns its lifecycle

#![deny(missing_docs)]

pub mod env;
pub mod pod;
pub mod registry;
pub mod resources;
pub mod secrets;
pub mod security;

pub use secrets::{RegistrySecretProvisioner, SecretsClient, SecretsClientImpl};
