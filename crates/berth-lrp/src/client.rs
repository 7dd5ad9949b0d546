//! Kubernetes access needed by the LRP controller
//!
//! Each trait is the narrow slice of the API one component uses, so tests
//! can mock exactly what a component touches.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use berth_common::crd::Lrp;
use berth_common::error::ErrorContext;
use berth_common::kube_utils::json_patch_from;
use berth_common::labels::{LABEL_GUID, LABEL_VERSION};
use berth_common::{Error, FIELD_MANAGER};

/// StatefulSet operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatefulSetClient: Send + Sync {
    /// Create a statefulset in its own namespace
    async fn create(&self, statefulset: &StatefulSet) -> Result<StatefulSet, Error>;

    /// Get a statefulset by name, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, Error>;

    /// List the statefulsets labelled with an LRP identity
    async fn list_by_lrp(
        &self,
        namespace: &str,
        guid: &str,
        version: &str,
    ) -> Result<Vec<StatefulSet>, Error>;

    /// Replace a statefulset; fails with a conflict if it changed since read
    async fn update(&self, statefulset: &StatefulSet) -> Result<StatefulSet, Error>;
}

/// PodDisruptionBudget operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodDisruptionBudgetClient: Send + Sync {
    /// Create a budget; an existing one is left alone
    async fn create(&self, pdb: &PodDisruptionBudget) -> Result<(), Error>;

    /// Delete a budget; a missing one is not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// LRP custom resource operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LrpClient: Send + Sync {
    /// Get an LRP, `None` if it was deleted
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Lrp>, Error>;

    /// Patch the status subresource with the difference between two copies
    async fn patch_status(&self, original: &Lrp, modified: &Lrp) -> Result<(), Error>;
}

/// The single statefulset backing an LRP identity
///
/// Zero matches is a not-found error; more than one is an inconsistency.
pub async fn statefulset_for_lrp(
    client: &dyn StatefulSetClient,
    lrp: &Lrp,
) -> Result<StatefulSet, Error> {
    let namespace = namespace_of(lrp)?;
    let mut statefulsets = client
        .list_by_lrp(&namespace, &lrp.spec.guid, &lrp.spec.version)
        .await
        .context("failed to list statefulsets")?;

    match statefulsets.len() {
        0 => Err(Error::not_found(
            "StatefulSet",
            format!("{}/{}", namespace, lrp.name_any()),
        )),
        1 => Ok(statefulsets.remove(0)),
        _ => Err(Error::inconsistent(format!(
            "multiple statefulsets found for LRP {{{}}}{}",
            namespace,
            lrp.name_any()
        ))),
    }
}

fn post_params() -> PostParams {
    PostParams {
        dry_run: false,
        field_manager: Some(FIELD_MANAGER.to_string()),
    }
}

fn namespace_of<K: Resource>(obj: &K) -> Result<String, Error> {
    obj.namespace()
        .ok_or_else(|| Error::validation(format!("{} has no namespace", obj.name_any())))
}

/// Real Kubernetes client implementation
pub struct StatefulSetClientImpl {
    client: Client,
}

impl StatefulSetClientImpl {
    /// Create a new StatefulSetClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatefulSetClient for StatefulSetClientImpl {
    async fn create(&self, statefulset: &StatefulSet) -> Result<StatefulSet, Error> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), &namespace_of(statefulset)?);
        Ok(api.create(&post_params(), statefulset).await?)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(sts) => Ok(Some(sts)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_by_lrp(
        &self,
        namespace: &str,
        guid: &str,
        version: &str,
    ) -> Result<Vec<StatefulSet>, Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{}={},{}={}", LABEL_GUID, guid, LABEL_VERSION, version);
        let list = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(list.items)
    }

    async fn update(&self, statefulset: &StatefulSet) -> Result<StatefulSet, Error> {
        let api: Api<StatefulSet> =
            Api::namespaced(self.client.clone(), &namespace_of(statefulset)?);
        Ok(api
            .replace(&statefulset.name_any(), &post_params(), statefulset)
            .await?)
    }
}

/// Real Kubernetes client implementation
pub struct PodDisruptionBudgetClientImpl {
    client: Client,
}

impl PodDisruptionBudgetClientImpl {
    /// Create a new PodDisruptionBudgetClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodDisruptionBudgetClient for PodDisruptionBudgetClientImpl {
    async fn create(&self, pdb: &PodDisruptionBudget) -> Result<(), Error> {
        let api: Api<PodDisruptionBudget> =
            Api::namespaced(self.client.clone(), &namespace_of(pdb)?);
        match api.create(&post_params(), pdb).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                debug!(pdb = %pdb.name_any(), "pod disruption budget already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<PodDisruptionBudget> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Real Kubernetes client implementation
pub struct LrpClientImpl {
    client: Client,
}

impl LrpClientImpl {
    /// Create a new LrpClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LrpClient for LrpClientImpl {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Lrp>, Error> {
        let api: Api<Lrp> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(lrp) => Ok(Some(lrp)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(&self, original: &Lrp, modified: &Lrp) -> Result<(), Error> {
        let Some(patch) = json_patch_from(original, modified)? else {
            debug!(lrp = %original.name_any(), "lrp status unchanged");
            return Ok(());
        };
        let api: Api<Lrp> = Api::namespaced(self.client.clone(), &namespace_of(original)?);
        api.patch_status(
            &original.name_any(),
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::<()>::Json(patch),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_common::testing::{sample_lrp, server_error};
    use kube::api::ObjectMeta;
    use mockall::predicate::eq;

    fn named(name: &str) -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_match_is_returned() {
        let mut client = MockStatefulSetClient::new();
        client
            .expect_list_by_lrp()
            .with(eq("apps"), eq("guid-1234"), eq("version-1234"))
            .returning(|_, _, _| Ok(vec![named("dora-dev-abc")]));

        let sts = statefulset_for_lrp(&client, &sample_lrp())
            .await
            .expect("found");
        assert_eq!(sts.name_any(), "dora-dev-abc");
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let mut client = MockStatefulSetClient::new();
        client.expect_list_by_lrp().returning(|_, _, _| Ok(vec![]));

        let err = statefulset_for_lrp(&client, &sample_lrp())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    /// Story: two statefulsets for one identity is never resolved by picking one
    #[tokio::test]
    async fn multiple_matches_are_inconsistent() {
        let mut client = MockStatefulSetClient::new();
        client
            .expect_list_by_lrp()
            .returning(|_, _, _| Ok(vec![named("a"), named("b")]));

        let err = statefulset_for_lrp(&client, &sample_lrp())
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("multiple statefulsets found for LRP {apps}my-lrp"));
    }

    #[tokio::test]
    async fn list_failure_is_wrapped() {
        let mut client = MockStatefulSetClient::new();
        client
            .expect_list_by_lrp()
            .returning(|_, _, _| Err(server_error()));

        let err = statefulset_for_lrp(&client, &sample_lrp())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to list statefulsets"));
    }
}
