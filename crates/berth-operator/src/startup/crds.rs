//! CRD installation on startup
//!
//! Both workload CRDs are applied with server-side apply so the installed
//! schema always matches the running operator.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use berth_common::crd::{Lrp, Task};
use berth_common::retry::{retry_with_backoff, RetryConfig};
use berth_common::FIELD_MANAGER;

/// Attempts per CRD before startup gives up
const CRD_INSTALL_ATTEMPTS: u32 = 10;

/// CRD definition with name and resource
pub struct CrdDef {
    /// Full CRD name, `<plural>.<group>`
    pub name: &'static str,
    /// The generated definition
    pub crd: CustomResourceDefinition,
}

/// Every CRD the operator reconciles
pub fn workload_crds() -> Vec<CrdDef> {
    vec![
        CrdDef {
            name: "lrps.berth.dev",
            crd: Lrp::crd(),
        },
        CrdDef {
            name: "tasks.berth.dev",
            crd: Task::crd(),
        },
    ]
}

/// Multi-document YAML of every CRD, as printed by `--crd`
pub fn crds_yaml() -> anyhow::Result<String> {
    workload_crds()
        .iter()
        .map(|def| {
            serde_yaml::to_string(&def.crd)
                .map_err(|e| anyhow::anyhow!("failed to serialize {} CRD: {}", def.name, e))
        })
        .collect::<anyhow::Result<Vec<_>>>()
        .map(|docs| docs.join("---\n"))
}

/// Ensure the workload CRDs are installed and current
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();
    let retry = RetryConfig::with_max_attempts(CRD_INSTALL_ATTEMPTS);

    for def in workload_crds() {
        tracing::info!(crd = def.name, "Installing CRD...");
        let patch = Patch::Apply(&def.crd);
        retry_with_backoff(&retry, "install_crd", || {
            crds.patch(def.name, &params, &patch)
        })
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {} CRD: {}", def.name, e))?;
    }

    tracing::info!("berth CRDs installed/updated");
    Ok(())
}
