//! LRP to StatefulSet conversion
//!
//! Pure: the same LRP, name and secret always produce the same StatefulSet.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodAffinityTerm,
    PodAntiAffinity, PodSpec, PodTemplateSpec, Secret, Volume, VolumeMount,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::ObjectMeta;
use kube::ResourceExt;

use berth_common::config::ControllerConfig;
use berth_common::crd::{Lrp, LrpSpec, Sidecar};
use berth_common::labels;
use berth_workload::env;
use berth_workload::pod::{image_pull_secrets, IdentityAnnotations};
use berth_workload::resources::{resource_requirements, ResourceAsk};
use berth_workload::security::{
    automount_service_account_token, container_security_context, pod_security_context,
};

use crate::probes::{liveness_probe, readiness_probe};

/// Name of the application container in every LRP pod
pub const APPLICATION_CONTAINER_NAME: &str = "opi";

const POD_MANAGEMENT_POLICY: &str = "Parallel";
const ANTI_AFFINITY_WEIGHT: i32 = 100;
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Labels selecting the pods of one LRP identity
pub fn selector_labels(spec: &LrpSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::LABEL_GUID.to_string(), spec.guid.clone()),
        (labels::LABEL_VERSION.to_string(), spec.version.clone()),
        (
            labels::LABEL_SOURCE_TYPE.to_string(),
            labels::SOURCE_TYPE_APP.to_string(),
        ),
    ])
}

fn identity_labels(spec: &LrpSpec) -> BTreeMap<String, String> {
    let mut labels = selector_labels(spec);
    labels.insert(labels::LABEL_APP_GUID.to_string(), spec.app_guid.clone());
    labels.insert(
        labels::LABEL_PROCESS_TYPE.to_string(),
        spec.process_type.clone(),
    );
    labels
}

fn identity_annotations(spec: &LrpSpec) -> BTreeMap<String, String> {
    let mut annotations = IdentityAnnotations {
        app_name: &spec.app_name,
        app_guid: &spec.app_guid,
        org_name: &spec.org_name,
        org_guid: &spec.org_guid,
        space_name: &spec.space_name,
        space_guid: &spec.space_guid,
    }
    .to_map();
    annotations.insert(labels::ANNOTATION_VERSION.to_string(), spec.version.clone());
    annotations.insert(
        labels::ANNOTATION_PROCESS_GUID.to_string(),
        spec.process_guid(),
    );
    annotations
}

/// Builds StatefulSets for LRPs
#[derive(Clone, Debug)]
pub struct LrpConverter {
    config: ControllerConfig,
}

impl LrpConverter {
    /// Create a converter using the controller's workload settings
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    /// Build the StatefulSet running `lrp`
    ///
    /// `private_registry_secret` is the secret provisioned for the LRP's
    /// private registry credentials, if any.
    pub fn convert(
        &self,
        statefulset_name: &str,
        lrp: &Lrp,
        private_registry_secret: Option<&Secret>,
    ) -> StatefulSet {
        let spec = &lrp.spec;
        let labels = identity_labels(spec);
        let annotations = identity_annotations(spec);

        let mut pod_annotations = spec.user_defined_annotations.clone();
        pod_annotations.extend(annotations.clone());

        let secret_name = private_registry_secret.map(|s| s.name_any());

        StatefulSet {
            metadata: ObjectMeta {
                name: Some(statefulset_name.to_string()),
                namespace: lrp.namespace(),
                labels: Some(labels.clone()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(StatefulSetSpec {
                replicas: Some(spec.instances),
                pod_management_policy: Some(POD_MANAGEMENT_POLICY.to_string()),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(spec)),
                    match_expressions: None,
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        annotations: Some(pod_annotations),
                        ..Default::default()
                    }),
                    spec: Some(self.pod_spec(spec, secret_name.as_deref())),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    fn pod_spec(&self, spec: &LrpSpec, private_registry_secret: Option<&str>) -> PodSpec {
        let ask = ResourceAsk {
            memory_mb: spec.memory_mb,
            disk_mb: spec.disk_mb,
            cpu_millis: spec.cpu_millis(),
        };

        let allow_root = self.config.allow_run_image_as_root;
        let mut containers = vec![self.application_container(spec, ask)];
        containers.extend(
            spec.sidecars
                .iter()
                .map(|sidecar| sidecar_container(spec, sidecar, ask, allow_root)),
        );

        let volumes: Vec<Volume> = spec
            .volume_mounts
            .iter()
            .map(|mount| Volume {
                name: mount.claim_name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: mount.claim_name.clone(),
                    read_only: None,
                }),
                ..Default::default()
            })
            .collect();

        PodSpec {
            containers,
            volumes: (!volumes.is_empty()).then_some(volumes),
            affinity: Some(anti_affinity(spec)),
            image_pull_secrets: image_pull_secrets(
                &self.config,
                private_registry_secret,
                &spec.image_pull_secrets,
            ),
            service_account_name: Some(self.config.application_service_account.clone()),
            automount_service_account_token: automount_service_account_token(&self.config),
            security_context: pod_security_context(self.config.allow_run_image_as_root),
            ..Default::default()
        }
    }

    fn application_container(&self, spec: &LrpSpec, ask: ResourceAsk) -> Container {
        let platform_env = env::merge_env([env::identity_env(), env::lrp_port_env(&spec.ports)]);
        let ports: Vec<ContainerPort> = spec
            .ports
            .iter()
            .map(|port| ContainerPort {
                container_port: *port,
                ..Default::default()
            })
            .collect();
        let volume_mounts: Vec<VolumeMount> = spec
            .volume_mounts
            .iter()
            .map(|mount| VolumeMount {
                name: mount.claim_name.clone(),
                mount_path: mount.mount_path.clone(),
                ..Default::default()
            })
            .collect();

        Container {
            name: APPLICATION_CONTAINER_NAME.to_string(),
            image: Some(spec.image.clone()),
            image_pull_policy: Some("Always".to_string()),
            command: Some(spec.command.clone()),
            env: Some(env::container_env(
                platform_env,
                &spec.env,
                &spec.environment,
            )),
            ports: (!ports.is_empty()).then_some(ports),
            resources: Some(resource_requirements(ask)),
            security_context: Some(container_security_context(
                self.config.allow_run_image_as_root,
            )),
            liveness_probe: liveness_probe(&spec.health),
            readiness_probe: readiness_probe(&spec.health),
            volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
            ..Default::default()
        }
    }
}

fn sidecar_container(
    spec: &LrpSpec,
    sidecar: &Sidecar,
    app_ask: ResourceAsk,
    allow_root: bool,
) -> Container {
    Container {
        name: sidecar.name.clone(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        command: Some(sidecar.command.clone()),
        env: Some(env::plain_env(&sidecar.env)),
        resources: Some(resource_requirements(app_ask.with_memory(sidecar.memory_mb))),
        security_context: Some(container_security_context(allow_root)),
        ..Default::default()
    }
}

fn anti_affinity(spec: &LrpSpec) -> Affinity {
    let requirement = |key: &str, value: &str| LabelSelectorRequirement {
        key: key.to_string(),
        operator: "In".to_string(),
        values: Some(vec![value.to_string()]),
    };

    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: ANTI_AFFINITY_WEIGHT,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_expressions: Some(vec![
                                requirement(labels::LABEL_GUID, &spec.guid),
                                requirement(labels::LABEL_VERSION, &spec.version),
                            ]),
                            match_labels: None,
                        }),
                        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                        ..Default::default()
                    },
                },
            ]),
            required_during_scheduling_ignored_during_execution: None,
        }),
        ..Default::default()
    }
}
