//! LRP controller entry points
//!
//! Wires the production clients into an [`LrpReconciler`] and adapts it to
//! the `kube::runtime::Controller` callbacks.

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::error;

use berth_common::config::ControllerConfig;
use berth_common::crd::Lrp;
use berth_common::events::{EventPublisher, KubeEventPublisher};
use berth_common::{Error, ReconcileRequest, FIELD_MANAGER};
use berth_workload::{RegistrySecretProvisioner, SecretsClientImpl};

use crate::client::{
    LrpClientImpl, PodDisruptionBudgetClientImpl, StatefulSetClient, StatefulSetClientImpl,
};
use crate::converter::LrpConverter;
use crate::desirer::StatefulSetDesirer;
use crate::pdb::{PdbUpdater, PodDisruptionBudgetUpdater};
use crate::reconciler::{LrpReconciler, StatefulSetWorkload};
use crate::status::StatefulSetStatusGetter;
use crate::updater::StatefulSetUpdater;

/// Delay before a failed LRP is reconciled again
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Shared context for the LRP controller
pub struct LrpContext {
    /// Reconciler driving every LRP
    pub reconciler: LrpReconciler,
}

impl LrpContext {
    /// Build the production reconciler on top of `client`
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let statefulsets: Arc<dyn StatefulSetClient> =
            Arc::new(StatefulSetClientImpl::new(client.clone()));
        let pdb: Arc<dyn PodDisruptionBudgetUpdater> = Arc::new(PdbUpdater::new(Arc::new(
            PodDisruptionBudgetClientImpl::new(client.clone()),
        )));
        let secrets = RegistrySecretProvisioner::new(Arc::new(SecretsClientImpl::new(
            client.clone(),
        )));

        let workload = StatefulSetWorkload::new(
            StatefulSetDesirer::new(
                secrets,
                statefulsets.clone(),
                LrpConverter::new(config),
                pdb.clone(),
            ),
            StatefulSetUpdater::new(statefulsets.clone(), pdb),
            StatefulSetStatusGetter::new(statefulsets.clone()),
        );
        let events: Arc<dyn EventPublisher> =
            Arc::new(KubeEventPublisher::new(client.clone(), FIELD_MANAGER));

        Self {
            reconciler: LrpReconciler::new(
                Arc::new(LrpClientImpl::new(client)),
                statefulsets,
                Arc::new(workload),
                events,
            ),
        }
    }

    /// Context around an already assembled reconciler
    pub fn from_reconciler(reconciler: LrpReconciler) -> Self {
        Self { reconciler }
    }
}

/// Reconcile an LRP resource
pub async fn reconcile(lrp: Arc<Lrp>, ctx: Arc<LrpContext>) -> Result<Action, Error> {
    let request = ReconcileRequest::for_object(lrp.as_ref())?;
    ctx.reconciler.reconcile(&request).await
}

/// Error policy for the LRP controller
pub fn error_policy(lrp: Arc<Lrp>, error: &Error, _ctx: Arc<LrpContext>) -> Action {
    error!(
        ?error,
        lrp = %lrp.name_any(),
        namespace = %lrp.namespace().unwrap_or_default(),
        "lrp reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
