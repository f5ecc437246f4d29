//! `kube`-backed cluster collaborator

use super::{operator_deployment, read_manifests, summarize_nodes, ClusterApi};
use crate::config::{ClusterConfig, MELLANOX_PCI_LABEL};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{Discovery, Scope};
use kube::{Client, Config, ResourceExt};
use std::path::Path;
use tracing::{debug, info, warn};

/// Field manager recorded on server-side applied objects
pub const FIELD_MANAGER: &str = "l8k";

/// Label carried by the network operator controller deployment
const OPERATOR_SELECTOR: &str = "app.kubernetes.io/name=network-operator";

/// Kubernetes API client for discovery and apply
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig, or the inferred in-cluster/default config
    pub async fn from_kubeconfig(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Failed to load kubeconfig")?
            }
            None => Config::infer()
                .await
                .context("Failed to infer Kubernetes configuration")?,
        };

        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    async fn operator_image(&self, namespace: &str) -> Result<Option<String>> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = deployments
            .list(&ListParams::default().labels(OPERATOR_SELECTOR))
            .await
            .with_context(|| format!("Failed to list deployments in {}", namespace))?;

        let image = list.items.iter().find_map(|deployment| {
            deployment
                .spec
                .as_ref()?
                .template
                .spec
                .as_ref()?
                .containers
                .first()?
                .image
                .clone()
        });
        Ok(image)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn discover(&self, namespace: &str) -> Result<ClusterConfig> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let selector = format!("{}=true", MELLANOX_PCI_LABEL);
        let list = nodes
            .list(&ListParams::default().labels(&selector))
            .await
            .context("Failed to list nodes")?;

        debug!(count = list.items.len(), selector = %selector, "Listed nodes");
        if list.items.is_empty() {
            warn!(selector = %selector, "No nodes with NVIDIA NICs found");
        }

        let names: Vec<String> = list.items.iter().map(|node| node.name_any()).collect();
        let mut config = summarize_nodes(
            names
                .iter()
                .map(String::as_str)
                .zip(list.items.iter().map(|node| node.labels())),
        );

        match self.operator_image(namespace).await? {
            Some(image) => {
                info!(namespace, image = %image, "Found network operator deployment");
                config.network_operator = Some(operator_deployment(namespace, Some(&image)));
            }
            None => debug!(namespace, "Network operator is not deployed"),
        }

        Ok(config)
    }

    async fn apply(&self, manifests_dir: &Path) -> Result<usize> {
        let objects = read_manifests(manifests_dir)?;
        if objects.is_empty() {
            warn!(dir = %manifests_dir.display(), "No manifests to apply");
            return Ok(0);
        }

        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .context("Failed to run API discovery")?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        for object in &objects {
            let name = object.name_any();
            let types = object
                .types
                .as_ref()
                .with_context(|| format!("Object {} has no apiVersion/kind", name))?;
            let gvk = GroupVersionKind::try_from(types)
                .with_context(|| format!("Invalid apiVersion for {}", name))?;
            let (resource, caps) = discovery
                .resolve_gvk(&gvk)
                .with_context(|| format!("Unknown resource kind {} for {}", gvk.kind, name))?;

            let api: Api<DynamicObject> = match caps.scope {
                Scope::Namespaced => {
                    let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
                    Api::namespaced_with(self.client.clone(), &namespace, &resource)
                }
                Scope::Cluster => Api::all_with(self.client.clone(), &resource),
            };

            api.patch(&name, &params, &Patch::Apply(object))
                .await
                .with_context(|| format!("Failed to apply {} {}", gvk.kind, name))?;
            info!(kind = %gvk.kind, name = %name, "Applied object");
        }

        Ok(objects.len())
    }
}
