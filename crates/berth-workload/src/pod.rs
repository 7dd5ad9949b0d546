//! Pod-level settings shared by statefulset and job templates

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::LocalObjectReference;

use berth_common::config::ControllerConfig;
use berth_common::labels;

/// Pull secrets for a workload pod: the platform secret, then the workload's
/// private registry secret, then any extras the workload lists
pub fn image_pull_secrets(
    config: &ControllerConfig,
    private_registry_secret: Option<&str>,
    extra: &[LocalObjectReference],
) -> Option<Vec<LocalObjectReference>> {
    let secrets: Vec<LocalObjectReference> = config
        .registry_secret_name
        .iter()
        .map(String::as_str)
        .chain(private_registry_secret)
        .map(|name| LocalObjectReference {
            name: name.to_string(),
        })
        .chain(extra.iter().cloned())
        .collect();

    if secrets.is_empty() {
        None
    } else {
        Some(secrets)
    }
}

/// Human-readable identity annotations common to both workload kinds
pub struct IdentityAnnotations<'a> {
    /// Application name
    pub app_name: &'a str,
    /// Application GUID
    pub app_guid: &'a str,
    /// Organization name
    pub org_name: &'a str,
    /// Organization GUID
    pub org_guid: &'a str,
    /// Space name
    pub space_name: &'a str,
    /// Space GUID
    pub space_guid: &'a str,
}

impl IdentityAnnotations<'_> {
    /// Render as an annotation map
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [
            (labels::ANNOTATION_APP_NAME, self.app_name),
            (labels::ANNOTATION_APP_ID, self.app_guid),
            (labels::ANNOTATION_ORG_NAME, self.org_name),
            (labels::ANNOTATION_ORG_GUID, self.org_guid),
            (labels::ANNOTATION_SPACE_NAME, self.space_name),
            (labels::ANNOTATION_SPACE_GUID, self.space_guid),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}
