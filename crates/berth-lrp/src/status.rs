//! LRP status from its StatefulSet

use std::sync::Arc;

use berth_common::crd::{Lrp, LrpStatus};
use berth_common::error::ErrorContext;
use berth_common::Error;

use crate::client::{statefulset_for_lrp, StatefulSetClient};

/// Reads the ready replica count of an LRP's StatefulSet
pub struct StatefulSetStatusGetter {
    statefulsets: Arc<dyn StatefulSetClient>,
}

impl StatefulSetStatusGetter {
    /// Create a status getter on top of a statefulset client
    pub fn new(statefulsets: Arc<dyn StatefulSetClient>) -> Self {
        Self { statefulsets }
    }

    /// Current status of `lrp`
    pub async fn get_status(&self, lrp: &Lrp) -> Result<LrpStatus, Error> {
        let statefulset = statefulset_for_lrp(self.statefulsets.as_ref(), lrp)
            .await
            .context("failed to get statefulset for LRP")?;

        Ok(LrpStatus {
            replicas: statefulset
                .status
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
        })
    }
}
