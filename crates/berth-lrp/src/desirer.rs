//! First-seen creation of an LRP's StatefulSet
//!
//! Order matters: the registry secret must exist before the pod template
//! references it, and can only be owned by the statefulset once that exists.
//! A failed create deletes the secret again.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use berth_common::crd::Lrp;
use berth_common::error::{CombinedError, ErrorContext};
use berth_common::kube_utils::set_controller_reference;
use berth_common::Error;
use berth_workload::RegistrySecretProvisioner;

use crate::client::StatefulSetClient;
use crate::converter::LrpConverter;
use crate::pdb::PodDisruptionBudgetUpdater;

/// Creates the StatefulSet, registry secret and disruption budget for an LRP
pub struct StatefulSetDesirer {
    secrets: RegistrySecretProvisioner,
    statefulsets: Arc<dyn StatefulSetClient>,
    converter: LrpConverter,
    pdb: Arc<dyn PodDisruptionBudgetUpdater>,
}

impl StatefulSetDesirer {
    /// Create a desirer from its collaborators
    pub fn new(
        secrets: RegistrySecretProvisioner,
        statefulsets: Arc<dyn StatefulSetClient>,
        converter: LrpConverter,
        pdb: Arc<dyn PodDisruptionBudgetUpdater>,
    ) -> Self {
        Self {
            secrets,
            statefulsets,
            converter,
            pdb,
        }
    }

    /// Create the native objects for `lrp`
    ///
    /// An already existing statefulset counts as success.
    pub async fn desire(&self, lrp: &Lrp) -> Result<(), Error> {
        let namespace = lrp
            .namespace()
            .ok_or_else(|| Error::validation(format!("LRP {} has no namespace", lrp.name_any())))?;
        let statefulset_name = lrp.spec.statefulset_name();

        let secret = match lrp.spec.private_registry.as_ref() {
            Some(registry) => Some(
                self.secrets
                    .provision(&namespace, &lrp.spec.image, registry)
                    .await
                    .context("failed to create private registry secret for statefulset")?,
            ),
            None => None,
        };

        let mut statefulset = self
            .converter
            .convert(&statefulset_name, lrp, secret.as_ref());
        statefulset.metadata.namespace = Some(namespace.clone());
        if let Err(e) = set_controller_reference(lrp, &mut statefulset) {
            return Err(self
                .cleanup_and_error(e.wrap("failed to set controller reference"), secret.as_ref())
                .await);
        }

        let created = match self.statefulsets.create(&statefulset).await {
            Ok(created) => created,
            Err(e) if e.is_already_exists() => {
                debug!(statefulset = %statefulset_name, namespace = %namespace, "statefulset already exists");
                if let Some(secret) = &secret {
                    if let Err(e) = self.secrets.cleanup(secret).await {
                        warn!(secret = %secret.name_any(), error = %e, "failed to cleanup unused registry secret");
                    }
                }
                return Ok(());
            }
            Err(e) => {
                return Err(self
                    .cleanup_and_error(e.wrap("failed to create statefulset"), secret.as_ref())
                    .await)
            }
        };
        info!(statefulset = %statefulset_name, namespace = %namespace, "created statefulset");

        if let Some(secret) = &secret {
            self.secrets
                .adopt(secret, &created)
                .await
                .context("failed to set owner to the registry secret")?;
        }

        self.pdb.update(&created, lrp).await
    }

    async fn cleanup_and_error(&self, error: Error, secret: Option<&Secret>) -> Error {
        let Some(secret) = secret else {
            return error;
        };
        match self.secrets.cleanup(secret).await {
            Ok(()) => error,
            Err(cleanup) => Error::Combined(CombinedError::new(
                error,
                cleanup.wrap("failed to cleanup registry secret"),
            )),
        }
    }
}
