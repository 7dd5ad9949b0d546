//! Scaling and image updates of an existing StatefulSet
//!
//! Only the replica count and the application image follow the LRP. Every
//! other field stays as it was created; changing those means recreating the
//! LRP.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::ResourceExt;
use tracing::{debug, info};

use berth_common::crd::{Lrp, LrpSpec};
use berth_common::error::ErrorContext;
use berth_common::retry::retry_on_conflict;
use berth_common::Error;

use crate::client::{statefulset_for_lrp, StatefulSetClient};
use crate::converter::APPLICATION_CONTAINER_NAME;
use crate::pdb::PodDisruptionBudgetUpdater;

/// Copy of `current` with the LRP's instance count and image applied
pub fn updated_statefulset(current: &StatefulSet, spec: &LrpSpec) -> StatefulSet {
    let mut updated = current.clone();
    let Some(sts_spec) = updated.spec.as_mut() else {
        return updated;
    };

    sts_spec.replicas = Some(spec.instances);

    if !spec.image.is_empty() {
        if let Some(pod_spec) = sts_spec.template.spec.as_mut() {
            pod_spec
                .containers
                .iter_mut()
                .filter(|c| c.name == APPLICATION_CONTAINER_NAME)
                .for_each(|c| c.image = Some(spec.image.clone()));
        }
    }

    updated
}

/// Applies LRP changes to its StatefulSet and disruption budget
pub struct StatefulSetUpdater {
    statefulsets: Arc<dyn StatefulSetClient>,
    pdb: Arc<dyn PodDisruptionBudgetUpdater>,
}

impl StatefulSetUpdater {
    /// Create an updater from its collaborators
    pub fn new(
        statefulsets: Arc<dyn StatefulSetClient>,
        pdb: Arc<dyn PodDisruptionBudgetUpdater>,
    ) -> Self {
        Self { statefulsets, pdb }
    }

    /// Bring the statefulset of `lrp` in line with its spec
    ///
    /// Re-reads and retries while the update loses optimistic-concurrency
    /// races.
    pub async fn update(&self, lrp: &Lrp) -> Result<(), Error> {
        retry_on_conflict("update_statefulset", || self.update_once(lrp))
            .await
            .context("failed to update statefulset")
    }

    async fn update_once(&self, lrp: &Lrp) -> Result<(), Error> {
        let current = statefulset_for_lrp(self.statefulsets.as_ref(), lrp).await?;
        let updated = updated_statefulset(&current, &lrp.spec);

        if updated == current {
            debug!(statefulset = %current.name_any(), "statefulset already up to date");
        } else {
            self.statefulsets.update(&updated).await?;
            info!(
                statefulset = %current.name_any(),
                replicas = lrp.spec.instances,
                "updated statefulset"
            );
        }

        self.pdb.update(&current, lrp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockStatefulSetClient;
    use crate::converter::LrpConverter;
    use crate::pdb::MockPodDisruptionBudgetUpdater;
    use berth_common::config::ControllerConfig;
    use berth_common::crd::Sidecar;
    use berth_common::testing::{conflict, sample_lrp, server_error};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn live_statefulset(lrp: &Lrp) -> StatefulSet {
        let mut sts = LrpConverter::new(ControllerConfig::default()).convert(
            &lrp.spec.statefulset_name(),
            lrp,
            None,
        );
        sts.metadata.uid = Some("sts-uid".to_string());
        sts.metadata.resource_version = Some("7".to_string());
        sts
    }

    fn replicas(sts: &StatefulSet) -> Option<i32> {
        sts.spec.as_ref().and_then(|s| s.replicas)
    }

    fn containers(sts: &StatefulSet) -> Vec<k8s_openapi::api::core::v1::Container> {
        sts.spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|p| p.containers.clone())
            .unwrap_or_default()
    }

    mod scoping {
        use super::*;

        /// Story: scaling touches the replica count and nothing else
        #[test]
        fn scaling_leaves_containers_untouched() {
            let mut lrp = sample_lrp();
            lrp.spec.sidecars = vec![Sidecar {
                name: "logger".to_string(),
                command: vec!["tail".to_string()],
                memory_mb: 64,
                ..Default::default()
            }];
            let current = live_statefulset(&lrp);

            lrp.spec.instances = 5;
            lrp.spec.command = vec!["changed".to_string()];
            let updated = updated_statefulset(&current, &lrp.spec);

            assert_eq!(replicas(&updated), Some(5));
            assert_eq!(containers(&updated), containers(&current));
            assert_eq!(updated.metadata, current.metadata);
        }

        #[test]
        fn image_change_applies_to_application_container_only() {
            let mut lrp = sample_lrp();
            lrp.spec.sidecars = vec![Sidecar {
                name: "logger".to_string(),
                ..Default::default()
            }];
            let current = live_statefulset(&lrp);

            lrp.spec.image = "eirini/dorini:v2".to_string();
            let updated = updated_statefulset(&current, &lrp.spec);

            let updated_containers = containers(&updated);
            assert_eq!(
                updated_containers[0].image.as_deref(),
                Some("eirini/dorini:v2")
            );
            assert_eq!(updated_containers[1].image.as_deref(), Some("eirini/dorini"));
        }

        #[test]
        fn empty_image_keeps_current_image() {
            let mut lrp = sample_lrp();
            let current = live_statefulset(&lrp);

            lrp.spec.image = String::new();
            let updated = updated_statefulset(&current, &lrp.spec);

            assert_eq!(containers(&updated), containers(&current));
        }
    }

    mod update {
        use super::*;

        /// Story: scaling 1 -> 0 updates replicas and hands the pre-update object to the budget
        #[tokio::test]
        async fn scale_down_updates_and_removes_budget() {
            let mut lrp = sample_lrp();
            lrp.spec.instances = 1;
            let current = live_statefulset(&lrp);
            lrp.spec.instances = 0;

            let mut statefulsets = MockStatefulSetClient::new();
            let listed = current.clone();
            statefulsets
                .expect_list_by_lrp()
                .returning(move |_, _, _| Ok(vec![listed.clone()]));
            statefulsets
                .expect_update()
                .withf(|sts| sts.spec.as_ref().and_then(|s| s.replicas) == Some(0))
                .times(1)
                .returning(|sts| Ok(sts.clone()));

            let mut pdb = MockPodDisruptionBudgetUpdater::new();
            pdb.expect_update()
                .withf(|sts, lrp| {
                    sts.spec.as_ref().and_then(|s| s.replicas) == Some(1) && lrp.spec.instances == 0
                })
                .times(1)
                .returning(|_, _| Ok(()));

            StatefulSetUpdater::new(Arc::new(statefulsets), Arc::new(pdb))
                .update(&lrp)
                .await
                .expect("updated");
        }

        /// Story: a concurrent writer causes a re-read and a second attempt
        #[tokio::test]
        async fn conflict_is_retried() {
            let lrp = sample_lrp();
            let mut scaled = lrp.clone();
            scaled.spec.instances = 3;
            let current = live_statefulset(&lrp);

            let mut statefulsets = MockStatefulSetClient::new();
            statefulsets
                .expect_list_by_lrp()
                .times(2)
                .returning(move |_, _, _| Ok(vec![current.clone()]));
            let attempts = Arc::new(AtomicU32::new(0));
            let counter = attempts.clone();
            statefulsets.expect_update().times(2).returning(move |sts| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(conflict())
                } else {
                    Ok(sts.clone())
                }
            });

            let mut pdb = MockPodDisruptionBudgetUpdater::new();
            pdb.expect_update().times(1).returning(|_, _| Ok(()));

            StatefulSetUpdater::new(Arc::new(statefulsets), Arc::new(pdb))
                .update(&scaled)
                .await
                .expect("updated after retry");
            assert_eq!(attempts.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn other_update_errors_fail_fast() {
            let lrp = sample_lrp();
            let mut scaled = lrp.clone();
            scaled.spec.instances = 3;
            let current = live_statefulset(&lrp);

            let mut statefulsets = MockStatefulSetClient::new();
            statefulsets
                .expect_list_by_lrp()
                .times(1)
                .returning(move |_, _, _| Ok(vec![current.clone()]));
            statefulsets
                .expect_update()
                .times(1)
                .returning(|_| Err(server_error()));

            let mut pdb = MockPodDisruptionBudgetUpdater::new();
            pdb.expect_update().never();

            let err = StatefulSetUpdater::new(Arc::new(statefulsets), Arc::new(pdb))
                .update(&scaled)
                .await
                .unwrap_err();
            assert!(err.to_string().starts_with("failed to update statefulset"));
        }

        #[tokio::test]
        async fn missing_statefulset_is_an_error() {
            let mut statefulsets = MockStatefulSetClient::new();
            statefulsets
                .expect_list_by_lrp()
                .returning(|_, _, _| Ok(vec![]));

            let err = StatefulSetUpdater::new(
                Arc::new(statefulsets),
                Arc::new(MockPodDisruptionBudgetUpdater::new()),
            )
            .update(&sample_lrp())
            .await
            .unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn budget_failure_is_returned() {
            let lrp = sample_lrp();
            let current = live_statefulset(&lrp);

            let mut statefulsets = MockStatefulSetClient::new();
            statefulsets
                .expect_list_by_lrp()
                .returning(move |_, _, _| Ok(vec![current.clone()]));

            let mut pdb = MockPodDisruptionBudgetUpdater::new();
            pdb.expect_update().returning(|_, _| {
                Err(server_error().wrap("failed to create pod disruption budget"))
            });

            let err = StatefulSetUpdater::new(Arc::new(statefulsets), Arc::new(pdb))
                .update(&lrp)
                .await
                .unwrap_err();
            assert!(err
                .to_string()
                .contains("failed to create pod disruption budget"));
        }
    }
}
