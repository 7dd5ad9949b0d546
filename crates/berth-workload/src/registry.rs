//! Private registry credentials as a dockerconfigjson Secret

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde::Serialize;

use berth_common::crd::PrivateRegistry;
use berth_common::Error;

/// generateName prefix for registry secrets
pub const REGISTRY_SECRET_PREFIX: &str = "private-registry-";

/// Secret type for docker credentials
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the docker config
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Registry assumed for images without an explicit host
pub const DEFAULT_REGISTRY_HOST: &str = "index.docker.io/v1/";

#[derive(Serialize)]
struct DockerConfig<'a> {
    auths: BTreeMap<&'a str, DockerAuth<'a>>,
}

#[derive(Serialize)]
struct DockerAuth<'a> {
    username: &'a str,
    password: &'a str,
    auth: String,
}

/// Registry host an image is pulled from
///
/// The first path component is a host when it looks like one (has a `.` or
/// a `:` port, or is `localhost`); otherwise the image lives on Docker Hub.
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => DEFAULT_REGISTRY_HOST,
    }
}

/// Serialized docker config granting `registry` access to `host`
pub fn docker_config_json(host: &str, registry: &PrivateRegistry) -> Result<String, Error> {
    let auth = STANDARD.encode(format!("{}:{}", registry.username, registry.password));
    let config = DockerConfig {
        auths: BTreeMap::from([(
            host,
            DockerAuth {
                username: &registry.username,
                password: &registry.password,
                auth,
            },
        )]),
    };
    serde_json::to_string(&config)
        .map_err(|e| Error::serialization_for_kind("Secret", e.to_string()))
}

/// Unowned registry secret for pulling `image`; the API server picks the name
pub fn registry_secret(
    namespace: &str,
    image: &str,
    registry: &PrivateRegistry,
) -> Result<Secret, Error> {
    let config = docker_config_json(registry_host(image), registry)?;
    Ok(Secret {
        metadata: ObjectMeta {
            generate_name: Some(REGISTRY_SECRET_PREFIX.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(config.into_bytes()),
        )])),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_common::testing::sample_registry;
    use rstest::rstest;

    #[rstest]
    #[case("busybox", DEFAULT_REGISTRY_HOST)]
    #[case("library/busybox:1.36", DEFAULT_REGISTRY_HOST)]
    #[case("registry.example.com/team/app:v1", "registry.example.com")]
    #[case("localhost/app", "localhost")]
    #[case("10.0.0.5:5000/app", "10.0.0.5:5000")]
    fn registry_host_from_image(#[case] image: &str, #[case] expected: &str) {
        assert_eq!(registry_host(image), expected);
    }

    #[test]
    fn docker_config_carries_basic_auth() {
        let json = docker_config_json("registry.example.com", &sample_registry())
            .expect("serializable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");

        let entry = &value["auths"]["registry.example.com"];
        assert_eq!(entry["username"], "admin");
        assert_eq!(entry["password"], "hunter2");
        assert_eq!(entry["auth"], STANDARD.encode("admin:hunter2"));
    }

    #[test]
    fn secret_is_generated_and_unowned() {
        let secret = registry_secret("apps", "registry.example.com/app", &sample_registry())
            .expect("valid secret");

        assert_eq!(
            secret.metadata.generate_name.as_deref(),
            Some(REGISTRY_SECRET_PREFIX)
        );
        assert!(secret.metadata.name.is_none());
        assert_eq!(secret.metadata.namespace.as_deref(), Some("apps"));
        assert!(secret.metadata.owner_references.is_none());
        assert_eq!(secret.type_.as_deref(), Some(DOCKER_CONFIG_JSON_TYPE));

        let data = secret.data.expect("data set");
        let config = String::from_utf8(data[DOCKER_CONFIG_JSON_KEY].0.clone()).expect("utf8");
        assert!(config.contains("registry.example.com"));
    }
}
