//! LRP reconciliation
//!
//! Each pass loads the LRP and looks for its StatefulSet by name. A missing
//! statefulset is desired; an existing one has its status read back onto the
//! LRP and is then updated. Status and update are both attempted even if
//! one fails.

use std::sync::Arc;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::Resource;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use berth_common::crd::{Lrp, LrpStatus};
use berth_common::error::{ErrorAccumulator, ErrorContext};
use berth_common::events::{EventPublisher, WorkloadEvent};
use berth_common::{Error, ReconcileRequest};

use crate::client::{LrpClient, StatefulSetClient};
use crate::desirer::StatefulSetDesirer;
use crate::status::StatefulSetStatusGetter;
use crate::updater::StatefulSetUpdater;

/// Workload operations the reconciler drives for an LRP
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LrpWorkload: Send + Sync {
    /// Create the native objects for a new LRP
    async fn desire(&self, lrp: &Lrp) -> Result<(), Error>;

    /// Apply spec changes to the existing native objects
    async fn update(&self, lrp: &Lrp) -> Result<(), Error>;

    /// Observed status of the native objects
    async fn get_status(&self, lrp: &Lrp) -> Result<LrpStatus, Error>;
}

/// [`LrpWorkload`] backed by a StatefulSet
pub struct StatefulSetWorkload {
    desirer: StatefulSetDesirer,
    updater: StatefulSetUpdater,
    status: StatefulSetStatusGetter,
}

impl StatefulSetWorkload {
    /// Combine the statefulset components
    pub fn new(
        desirer: StatefulSetDesirer,
        updater: StatefulSetUpdater,
        status: StatefulSetStatusGetter,
    ) -> Self {
        Self {
            desirer,
            updater,
            status,
        }
    }
}

#[async_trait]
impl LrpWorkload for StatefulSetWorkload {
    async fn desire(&self, lrp: &Lrp) -> Result<(), Error> {
        self.desirer.desire(lrp).await
    }

    async fn update(&self, lrp: &Lrp) -> Result<(), Error> {
        self.updater.update(lrp).await
    }

    async fn get_status(&self, lrp: &Lrp) -> Result<LrpStatus, Error> {
        self.status.get_status(lrp).await
    }
}

/// Converges LRPs onto StatefulSets
pub struct LrpReconciler {
    lrps: Arc<dyn LrpClient>,
    statefulsets: Arc<dyn StatefulSetClient>,
    workload: Arc<dyn LrpWorkload>,
    events: Arc<dyn EventPublisher>,
}

impl LrpReconciler {
    /// Create a reconciler from its collaborators
    pub fn new(
        lrps: Arc<dyn LrpClient>,
        statefulsets: Arc<dyn StatefulSetClient>,
        workload: Arc<dyn LrpWorkload>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            lrps,
            statefulsets,
            workload,
            events,
        }
    }

    /// Reconcile the LRP named by `request`
    ///
    /// LRPs are never requeued on success; changes to the LRP or its
    /// statefulset trigger the next pass.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<Action, Error> {
        let Some(lrp) = self
            .lrps
            .get(&request.namespace, &request.name)
            .await
            .context("failed to get lrp")?
        else {
            debug!(lrp = %request, "lrp not found");
            return Ok(Action::await_change());
        };

        let statefulset_name = lrp.spec.statefulset_name();
        let existing = self
            .statefulsets
            .get(&request.namespace, &statefulset_name)
            .await
            .context("failed to get statefulSet")?;

        if existing.is_none() {
            self.desire(&lrp, &statefulset_name).await?;
            return Ok(Action::await_change());
        }

        let mut errors = ErrorAccumulator::new();
        errors.record(
            self.update_status(&lrp)
                .await
                .context("failed to update lrp status"),
        );
        errors.record(
            self.workload
                .update(&lrp)
                .await
                .context("failed to update app"),
        );
        errors.into_result()?;

        Ok(Action::await_change())
    }

    async fn desire(&self, lrp: &Lrp, statefulset_name: &str) -> Result<(), Error> {
        let reference = lrp.object_ref(&());
        match self.workload.desire(lrp).await {
            Ok(()) => {
                info!(lrp = %statefulset_name, "desired lrp");
                self.events
                    .publish(&reference, WorkloadEvent::created("statefulset", statefulset_name))
                    .await;
                Ok(())
            }
            Err(e) => {
                self.events
                    .publish(&reference, WorkloadEvent::create_failed(&e))
                    .await;
                Err(e.wrap("failed to desire lrp"))
            }
        }
    }

    async fn update_status(&self, lrp: &Lrp) -> Result<(), Error> {
        let status = self.workload.get_status(lrp).await?;
        let mut modified = lrp.clone();
        modified.status = Some(status);
        self.lrps.patch_status(lrp, &modified).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockLrpClient, MockStatefulSetClient};
    use berth_common::events::NoopEventPublisher;
    use berth_common::testing::{sample_lrp, server_error};
    use k8s_openapi::api::apps::v1::StatefulSet;
    use k8s_openapi::api::core::v1::ObjectReference;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Events {}

        #[async_trait]
        impl EventPublisher for Events {
            async fn publish(&self, regarding: &ObjectReference, event: WorkloadEvent);
        }
    }

    fn request() -> ReconcileRequest {
        ReconcileRequest::new("apps", "my-lrp")
    }

    fn lrps_returning(lrp: Option<Lrp>) -> MockLrpClient {
        let mut lrps = MockLrpClient::new();
        lrps.expect_get()
            .with(eq("apps"), eq("my-lrp"))
            .returning(move |_, _| Ok(lrp.clone()));
        lrps
    }

    fn statefulsets_returning(sts: Option<StatefulSet>) -> MockStatefulSetClient {
        let mut statefulsets = MockStatefulSetClient::new();
        let name = sample_lrp().spec.statefulset_name();
        statefulsets
            .expect_get()
            .withf(move |ns, n| ns == "apps" && n == name)
            .returning(move |_, _| Ok(sts.clone()));
        statefulsets
    }

    fn reconciler(
        lrps: MockLrpClient,
        statefulsets: MockStatefulSetClient,
        workload: MockLrpWorkload,
    ) -> LrpReconciler {
        LrpReconciler::new(
            Arc::new(lrps),
            Arc::new(statefulsets),
            Arc::new(workload),
            Arc::new(NoopEventPublisher),
        )
    }

    /// Story: a deleted LRP settles without touching anything
    #[tokio::test]
    async fn deleted_lrp_is_settled() {
        let mut workload = MockLrpWorkload::new();
        workload.expect_desire().never();
        workload.expect_update().never();

        let action = reconciler(lrps_returning(None), MockStatefulSetClient::new(), workload)
            .reconcile(&request())
            .await
            .expect("settled");
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn get_lrp_failure_is_wrapped() {
        let mut lrps = MockLrpClient::new();
        lrps.expect_get().returning(|_, _| Err(server_error()));

        let err = reconciler(lrps, MockStatefulSetClient::new(), MockLrpWorkload::new())
            .reconcile(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to get lrp"));
    }

    mod absent_statefulset {
        use super::*;

        /// Story: the first reconcile of an LRP desires its statefulset and publishes an event
        #[tokio::test]
        async fn desires_and_publishes_event() {
            let mut workload = MockLrpWorkload::new();
            workload.expect_desire().times(1).returning(|_| Ok(()));
            workload.expect_update().never();
            workload.expect_get_status().never();

            let mut events = MockEvents::new();
            events
                .expect_publish()
                .withf(|reference, event| {
                    reference.name.as_deref() == Some("my-lrp")
                        && event.reason == "Created"
                        && event.note.starts_with("Created statefulset ")
                })
                .times(1)
                .returning(|_, _| ());

            let action = LrpReconciler::new(
                Arc::new(lrps_returning(Some(sample_lrp()))),
                Arc::new(statefulsets_returning(None)),
                Arc::new(workload),
                Arc::new(events),
            )
            .reconcile(&request())
            .await
            .expect("desired");
            assert_eq!(action, Action::await_change());
        }

        #[tokio::test]
        async fn desire_failure_is_wrapped() {
            let mut workload = MockLrpWorkload::new();
            workload
                .expect_desire()
                .returning(|_| Err(server_error().wrap("failed to create statefulset")));

            let err = reconciler(
                lrps_returning(Some(sample_lrp())),
                statefulsets_returning(None),
                workload,
            )
            .reconcile(&request())
            .await
            .unwrap_err();
            assert!(err
                .to_string()
                .starts_with("failed to desire lrp: failed to create statefulset"));
        }

        #[tokio::test]
        async fn get_statefulset_failure_is_wrapped() {
            let mut statefulsets = MockStatefulSetClient::new();
            statefulsets
                .expect_get()
                .returning(|_, _| Err(server_error()));
            let mut workload = MockLrpWorkload::new();
            workload.expect_desire().never();

            let err = reconciler(lrps_returning(Some(sample_lrp())), statefulsets, workload)
                .reconcile(&request())
                .await
                .unwrap_err();
            assert!(err.to_string().starts_with("failed to get statefulSet"));
        }
    }

    mod present_statefulset {
        use super::*;

        /// Story: an existing LRP gets its ready replicas written back and is updated
        #[tokio::test]
        async fn patches_status_and_updates() {
            let mut workload = MockLrpWorkload::new();
            workload.expect_desire().never();
            workload
                .expect_get_status()
                .returning(|_| Ok(LrpStatus { replicas: 2 }));
            workload.expect_update().times(1).returning(|_| Ok(()));

            let mut lrps = lrps_returning(Some(sample_lrp()));
            lrps.expect_patch_status()
                .withf(|original, modified| {
                    original.status.is_none()
                        && modified.status == Some(LrpStatus { replicas: 2 })
                        && original.spec == modified.spec
                })
                .times(1)
                .returning(|_, _| Ok(()));

            let action = reconciler(
                lrps,
                statefulsets_returning(Some(StatefulSet::default())),
                workload,
            )
            .reconcile(&request())
            .await
            .expect("reconciled");
            assert_eq!(action, Action::await_change());
        }

        /// Story: a failed status read does not stop the update
        #[tokio::test]
        async fn update_runs_when_status_fails() {
            let mut workload = MockLrpWorkload::new();
            workload
                .expect_get_status()
                .returning(|_| Err(server_error()));
            workload.expect_update().times(1).returning(|_| Ok(()));

            let err = reconciler(
                lrps_returning(Some(sample_lrp())),
                statefulsets_returning(Some(StatefulSet::default())),
                workload,
            )
            .reconcile(&request())
            .await
            .unwrap_err();
            assert!(err.to_string().starts_with("failed to update lrp status"));
            assert!(!matches!(err, Error::Combined(_)));
        }

        /// Story: status and update failures are both reported
        #[tokio::test]
        async fn both_failures_are_combined() {
            let mut workload = MockLrpWorkload::new();
            workload
                .expect_get_status()
                .returning(|_| Err(server_error()));
            workload
                .expect_update()
                .returning(|_| Err(server_error()));

            let err = reconciler(
                lrps_returning(Some(sample_lrp())),
                statefulsets_returning(Some(StatefulSet::default())),
                workload,
            )
            .reconcile(&request())
            .await
            .unwrap_err();

            let Error::Combined(combined) = &err else {
                panic!("expected combined error, got {err}");
            };
            let messages: Vec<String> = combined.errors().map(|e| e.to_string()).collect();
            assert!(messages[0].starts_with("failed to update lrp status"));
            assert!(messages[1].starts_with("failed to update app"));
        }

        #[tokio::test]
        async fn patch_failure_is_reported() {
            let mut workload = MockLrpWorkload::new();
            workload
                .expect_get_status()
                .returning(|_| Ok(LrpStatus { replicas: 1 }));
            workload.expect_update().returning(|_| Ok(()));

            let mut lrps = lrps_returning(Some(sample_lrp()));
            lrps.expect_patch_status()
                .returning(|_, _| Err(server_error()));

            let err = reconciler(
                lrps,
                statefulsets_returning(Some(StatefulSet::default())),
                workload,
            )
            .reconcile(&request())
            .await
            .unwrap_err();
            assert!(err.to_string().starts_with("failed to update lrp status"));
        }
    }
}
