//! Registry secret lifecycle
//!
//! A registry secret is created unowned before the native object exists,
//! re-parented to the native object once that is created, and deleted again
//! if creating the native object fails.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use berth_common::crd::PrivateRegistry;
use berth_common::kube_utils::owner_reference;
use berth_common::{Error, FIELD_MANAGER};

use crate::registry::registry_secret;

/// Secret operations needed to provision registry credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretsClient: Send + Sync {
    /// Create a secret, returning it as persisted
    async fn create(&self, secret: &Secret) -> Result<Secret, Error>;

    /// Replace the owner references of a secret with `owner`
    async fn set_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: &OwnerReference,
    ) -> Result<(), Error>;

    /// Delete a secret; a missing secret is not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct SecretsClientImpl {
    client: Client,
}

impl SecretsClientImpl {
    /// Create a new SecretsClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretsClient for SecretsClientImpl {
    async fn create(&self, secret: &Secret) -> Result<Secret, Error> {
        let namespace = secret
            .namespace()
            .ok_or_else(|| Error::validation("secret has no namespace"))?;
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), secret).await?)
    }

    async fn set_owner(
        &self,
        namespace: &str,
        name: &str,
        owner: &OwnerReference,
    ) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "metadata": { "ownerReferences": [owner] }
        });
        api.patch(
            name,
            &PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            },
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(secret = %name, namespace = %namespace, "secret already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Creates, adopts and cleans up private registry secrets
#[derive(Clone)]
pub struct RegistrySecretProvisioner {
    client: Arc<dyn SecretsClient>,
}

impl RegistrySecretProvisioner {
    /// Create a provisioner on top of a secrets client
    pub fn new(client: Arc<dyn SecretsClient>) -> Self {
        Self { client }
    }

    /// Create an unowned registry secret for pulling `image`
    pub async fn provision(
        &self,
        namespace: &str,
        image: &str,
        registry: &PrivateRegistry,
    ) -> Result<Secret, Error> {
        let secret = registry_secret(namespace, image, registry)?;
        let created = self.client.create(&secret).await?;
        if created.metadata.name.is_none() {
            return Err(Error::internal_with_context(
                "provision_registry_secret",
                "created secret has no name",
            ));
        }
        info!(secret = %created.name_any(), namespace = %namespace, "created registry secret");
        Ok(created)
    }

    /// Make `owner` the controller of a provisioned secret
    pub async fn adopt<K>(&self, secret: &Secret, owner: &K) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()>,
    {
        let reference = owner_reference(owner, true)?;
        let namespace = secret.namespace().unwrap_or_default();
        self.client
            .set_owner(&namespace, &secret.name_any(), &reference)
            .await
    }

    /// Delete a provisioned secret
    pub async fn cleanup(&self, secret: &Secret) -> Result<(), Error> {
        let namespace = secret.namespace().unwrap_or_default();
        self.client.delete(&namespace, &secret.name_any()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_common::testing::{sample_registry, server_error};
    use k8s_openapi::api::apps::v1::StatefulSet;
    use kube::api::ObjectMeta;
    use mockall::predicate::eq;

    fn created(secret: &Secret) -> Secret {
        let mut created = secret.clone();
        created.metadata.name = Some("private-registry-x7k2p".to_string());
        created
    }

    fn stateful_set() -> StatefulSet {
        StatefulSet {
            metadata: ObjectMeta {
                name: Some("dora-dev-0123456789".to_string()),
                namespace: Some("apps".to_string()),
                uid: Some("sts-uid".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    mod provision {
        use super::*;

        /// Story: the secret is created with a generated name in the workload namespace
        #[tokio::test]
        async fn creates_generated_secret() {
            let mut client = MockSecretsClient::new();
            client
                .expect_create()
                .withf(|s| {
                    s.metadata.generate_name.as_deref() == Some("private-registry-")
                        && s.metadata.namespace.as_deref() == Some("apps")
                })
                .times(1)
                .returning(|s| Ok(created(s)));

            let provisioner = RegistrySecretProvisioner::new(Arc::new(client));
            let secret = provisioner
                .provision("apps", "registry.example.com/app", &sample_registry())
                .await
                .expect("provisioned");

            assert_eq!(secret.name_any(), "private-registry-x7k2p");
        }

        #[tokio::test]
        async fn create_failure_is_returned() {
            let mut client = MockSecretsClient::new();
            client.expect_create().returning(|_| Err(server_error()));

            let provisioner = RegistrySecretProvisioner::new(Arc::new(client));
            let result = provisioner
                .provision("apps", "busybox", &sample_registry())
                .await;

            assert!(result.is_err());
        }
    }

    mod adopt {
        use super::*;

        /// Story: once the statefulset exists, it becomes the secret's controller
        #[tokio::test]
        async fn sets_native_object_as_controller() {
            let mut client = MockSecretsClient::new();
            client
                .expect_set_owner()
                .with(
                    eq("apps"),
                    eq("private-registry-x7k2p"),
                    mockall::predicate::function(|o: &OwnerReference| {
                        o.kind == "StatefulSet" && o.uid == "sts-uid" && o.controller == Some(true)
                    }),
                )
                .times(1)
                .returning(|_, _, _| Ok(()));

            let provisioner = RegistrySecretProvisioner::new(Arc::new(client));
            let secret = created(
                &registry_secret("apps", "busybox", &sample_registry()).expect("secret"),
            );

            provisioner
                .adopt(&secret, &stateful_set())
                .await
                .expect("adopted");
        }

        #[tokio::test]
        async fn owner_without_uid_is_rejected() {
            let provisioner = RegistrySecretProvisioner::new(Arc::new(MockSecretsClient::new()));
            let mut owner = stateful_set();
            owner.metadata.uid = None;
            let secret = created(
                &registry_secret("apps", "busybox", &sample_registry()).expect("secret"),
            );

            assert!(provisioner.adopt(&secret, &owner).await.is_err());
        }
    }

    #[tokio::test]
    async fn cleanup_deletes_by_name() {
        let mut client = MockSecretsClient::new();
        client
            .expect_delete()
            .with(eq("apps"), eq("private-registry-x7k2p"))
            .times(1)
            .returning(|_, _| Ok(()));

        let provisioner = RegistrySecretProvisioner::new(Arc::new(client));
        let secret = created(
            &registry_secret("apps", "busybox", &sample_registry()).expect("secret"),
        );

        provisioner.cleanup(&secret).await.expect("deleted");
    }
}
