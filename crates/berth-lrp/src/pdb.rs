//! Pod disruption budgets for multi-instance LRPs
//!
//! A budget exists iff the LRP wants more than one instance. It keeps half
//! of the instances available, expressed as a percentage so it stays right
//! across scaling.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use berth_common::crd::Lrp;
use berth_common::error::ErrorContext;
use berth_common::kube_utils::owner_reference;
use berth_common::Error;

use crate::client::PodDisruptionBudgetClient;
use crate::converter::selector_labels;

/// Share of instances kept available during voluntary disruptions
pub const MIN_AVAILABLE: &str = "50%";

/// Keeps the disruption budget of a statefulset in line with its LRP
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodDisruptionBudgetUpdater: Send + Sync {
    /// Create or delete the budget for `statefulset` depending on `lrp`
    async fn update(&self, statefulset: &StatefulSet, lrp: &Lrp) -> Result<(), Error>;
}

/// Budget protecting the pods of `statefulset`, owned by it
pub fn pod_disruption_budget(
    statefulset: &StatefulSet,
    lrp: &Lrp,
) -> Result<PodDisruptionBudget, Error> {
    Ok(PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(statefulset.name_any()),
            namespace: statefulset.namespace(),
            owner_references: Some(vec![owner_reference(statefulset, true)?]),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::String(MIN_AVAILABLE.to_string())),
            selector: Some(LabelSelector {
                match_labels: Some(selector_labels(&lrp.spec)),
                match_expressions: None,
            }),
            ..Default::default()
        }),
        status: None,
    })
}

/// [`PodDisruptionBudgetUpdater`] backed by the API
pub struct PdbUpdater {
    client: Arc<dyn PodDisruptionBudgetClient>,
}

impl PdbUpdater {
    /// Create an updater on top of a budget client
    pub fn new(client: Arc<dyn PodDisruptionBudgetClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodDisruptionBudgetUpdater for PdbUpdater {
    async fn update(&self, statefulset: &StatefulSet, lrp: &Lrp) -> Result<(), Error> {
        let name = statefulset.name_any();
        let namespace = statefulset.namespace().unwrap_or_default();

        if lrp.spec.instances > 1 {
            debug!(pdb = %name, namespace = %namespace, "ensuring pod disruption budget");
            let pdb = pod_disruption_budget(statefulset, lrp)
                .context("failed to create pod disruption budget")?;
            return self
                .client
                .create(&pdb)
                .await
                .context("failed to create pod disruption budget");
        }

        debug!(pdb = %name, namespace = %namespace, "removing pod disruption budget");
        self.client
            .delete(&namespace, &name)
            .await
            .context("failed to delete pod disruption budget")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockPodDisruptionBudgetClient;
    use berth_common::labels;
    use berth_common::testing::{sample_lrp, server_error};
    use mockall::predicate::eq;
    use rstest::rstest;

    fn stateful_set() -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("dora-dev-abc".to_string()),
                namespace: Some("apps".to_string()),
                uid: Some("sts-uid".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn lrp_with_instances(instances: i32) -> Lrp {
        let mut lrp = sample_lrp();
        lrp.spec.instances = instances;
        lrp
    }

    /// Story: scaling to two instances creates a 50% budget owned by the statefulset
    #[tokio::test]
    async fn multiple_instances_get_a_budget() {
        let mut client = MockPodDisruptionBudgetClient::new();
        client
            .expect_create()
            .withf(|pdb| {
                let spec = pdb.spec.as_ref();
                let selector = spec
                    .and_then(|s| s.selector.as_ref())
                    .and_then(|s| s.match_labels.as_ref());
                pdb.metadata.name.as_deref() == Some("dora-dev-abc")
                    && pdb.metadata.namespace.as_deref() == Some("apps")
                    && spec.and_then(|s| s.min_available.clone())
                        == Some(IntOrString::String("50%".to_string()))
                    && selector.map(|s| s[labels::LABEL_GUID].as_str()) == Some("guid-1234")
                    && pdb
                        .metadata
                        .owner_references
                        .as_ref()
                        .is_some_and(|refs| refs[0].uid == "sts-uid")
            })
            .times(1)
            .returning(|_| Ok(()));

        PdbUpdater::new(Arc::new(client))
            .update(&stateful_set(), &lrp_with_instances(2))
            .await
            .expect("budget created");
    }

    /// Story: scaling down to one instance or below removes the budget
    #[rstest]
    #[case::scaled_to_zero(0)]
    #[case::single_instance(1)]
    #[tokio::test]
    async fn at_most_one_instance_has_no_budget(#[case] instances: i32) {
        let mut client = MockPodDisruptionBudgetClient::new();
        client
            .expect_delete()
            .with(eq("apps"), eq("dora-dev-abc"))
            .times(1)
            .returning(|_, _| Ok(()));
        client.expect_create().never();

        PdbUpdater::new(Arc::new(client))
            .update(&stateful_set(), &lrp_with_instances(instances))
            .await
            .expect("budget removed");
    }

    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(50)]
    #[tokio::test]
    async fn budget_stays_at_half_for_any_scale(#[case] instances: i32) {
        let mut client = MockPodDisruptionBudgetClient::new();
        client
            .expect_create()
            .withf(|pdb| {
                pdb.spec.as_ref().and_then(|s| s.min_available.clone())
                    == Some(IntOrString::String("50%".to_string()))
            })
            .times(1)
            .returning(|_| Ok(()));
        client.expect_delete().never();

        PdbUpdater::new(Arc::new(client))
            .update(&stateful_set(), &lrp_with_instances(instances))
            .await
            .expect("budget created");
    }

    #[tokio::test]
    async fn create_failure_is_wrapped() {
        let mut client = MockPodDisruptionBudgetClient::new();
        client.expect_create().returning(|_| Err(server_error()));

        let err = PdbUpdater::new(Arc::new(client))
            .update(&stateful_set(), &lrp_with_instances(3))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to create pod disruption budget"));
    }

    #[tokio::test]
    async fn delete_failure_is_wrapped() {
        let mut client = MockPodDisruptionBudgetClient::new();
        client.expect_delete().returning(|_, _| Err(server_error()));

        let err = PdbUpdater::new(Arc::new(client))
            .update(&stateful_set(), &lrp_with_instances(1))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("failed to delete pod disruption budget"));
    }
}
