//! Security settings applied to every workload container and pod

use k8s_openapi::api::core::v1::{Capabilities, PodSecurityContext, SeccompProfile, SecurityContext};

use berth_common::config::ControllerConfig;

/// Restrictive container security context: no escalation, no capabilities,
/// runtime-default seccomp
///
/// Non-root is enforced unless `allow_root` is set.
pub fn container_security_context(allow_root: bool) -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        run_as_non_root: (!allow_root).then_some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: None,
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_string(),
            localhost_profile: None,
        }),
        ..Default::default()
    }
}

/// Pod security context forcing non-root images
pub fn pod_security_context(allow_root: bool) -> Option<PodSecurityContext> {
    if allow_root {
        return None;
    }
    Some(PodSecurityContext {
        run_as_non_root: Some(true),
        ..Default::default()
    })
}

/// Service account token mounting: off unless the config opts out
pub fn automount_service_account_token(config: &ControllerConfig) -> Option<bool> {
    if config.unsafe_allow_automount_service_account_token {
        None
    } else {
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_context_is_locked_down() {
        let ctx = container_security_context(false);

        assert_eq!(ctx.allow_privilege_escalation, Some(false));
        assert_eq!(ctx.run_as_non_root, Some(true));
        assert_eq!(
            ctx.capabilities.and_then(|c| c.drop),
            Some(vec!["ALL".to_string()])
        );
        assert_eq!(
            ctx.seccomp_profile.map(|p| p.type_).as_deref(),
            Some("RuntimeDefault")
        );
    }

    #[test]
    fn root_images_keep_the_rest_of_the_container_lockdown() {
        let ctx = container_security_context(true);

        assert_eq!(ctx.run_as_non_root, None);
        assert_eq!(ctx.allow_privilege_escalation, Some(false));
        assert_eq!(
            ctx.capabilities.and_then(|c| c.drop),
            Some(vec!["ALL".to_string()])
        );
    }

    #[test]
    fn root_images_drop_the_pod_context() {
        assert!(pod_security_context(true).is_none());
        assert_eq!(
            pod_security_context(false).and_then(|c| c.run_as_non_root),
            Some(true)
        );
    }

    #[test]
    fn token_automount_is_disabled_by_default() {
        let mut config = ControllerConfig::default();
        assert_eq!(automount_service_account_token(&config), Some(false));

        config.unsafe_allow_automount_service_account_token = true;
        assert_eq!(automount_service_account_token(&config), None);
    }
}
