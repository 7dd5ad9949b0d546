//! Kubernetes helpers shared by the controllers

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource, ResourceExt};
use serde::Serialize;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read timeout for kube clients; watches must time out before this
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {}", e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Namespace and name of the object a reconcile pass is about
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReconcileRequest {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ReconcileRequest {
    /// Create a request for `namespace/name`
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the request for a namespaced object
    pub fn for_object<K: Resource>(obj: &K) -> Result<Self, Error> {
        let namespace = obj
            .namespace()
            .ok_or_else(|| Error::validation(format!("{} has no namespace", obj.name_any())))?;
        Ok(Self::new(namespace, obj.name_any()))
    }
}

impl std::fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Build an owner reference pointing at `owner`
///
/// Fails if the owner has not been persisted yet (no name or uid).
pub fn owner_reference<K>(owner: &K, controller: bool) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let meta = owner.meta();
    let name = meta
        .name
        .clone()
        .ok_or_else(|| Error::validation(format!("{} owner has no name", kind)))?;
    let uid = meta
        .uid
        .clone()
        .ok_or_else(|| Error::validation(format!("{} {} has no uid", kind, name)))?;

    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: kind.to_string(),
        name,
        uid,
        controller: Some(controller),
        block_owner_deletion: Some(true),
    })
}

/// Make `owner` the controller of `object` so it is garbage-collected with it
///
/// Fails if `object` is already controlled by something else.
pub fn set_controller_reference<K, O>(owner: &K, object: &mut O) -> Result<(), Error>
where
    K: Resource<DynamicType = ()>,
    O: Resource,
{
    let reference = owner_reference(owner, true)?;
    let refs = object.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != reference.uid)
    {
        return Err(Error::validation(format!(
            "object is already owned by another controller {}/{}",
            existing.kind, existing.name
        )));
    }

    refs.retain(|r| r.uid != reference.uid);
    refs.push(reference);
    Ok(())
}

/// JSON patch that turns `original` into `modified`; `None` when they
/// serialize the same
pub fn json_patch_from<T: Serialize>(
    original: &T,
    modified: &T,
) -> Result<Option<json_patch::Patch>, Error> {
    let orig = serde_json::to_value(original)
        .map_err(|e| Error::serialization(format!("failed to serialize original: {}", e)))?;
    let modi = serde_json::to_value(modified)
        .map_err(|e| Error::serialization(format!("failed to serialize modified: {}", e)))?;

    let patch = json_patch::diff(&orig, &modi);
    if patch.0.is_empty() {
        return Ok(None);
    }
    Ok(Some(patch))
}
