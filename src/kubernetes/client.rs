use async_trait::async_trait;
use kube::api::{DynamicObject, ListParams, ObjectList, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::registry::{ApiGroup, KindDescriptor, KindRegistry};
use super::throttle::RequestLimiter;
use super::NamespacedObjectRef;
use crate::config::Config;
use crate::error::{MeshError, Result};
use crate::mesh::objects::ConfigObject;
use crate::mesh::ConfigSource;

/// Build a kube client from the connection settings.
///
/// Resolution order: in-cluster service account when `in_cluster` is set,
/// then the kubeconfig (configured context or current context), then the
/// `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` environment over
/// plain HTTP.
pub async fn build_client(config: &Config) -> anyhow::Result<Client> {
    use anyhow::Context;

    let mut kube_config = if config.in_cluster {
        info!("Using in-cluster configuration");
        kube::Config::incluster().context("Failed to load in-cluster configuration")?
    } else {
        match Kubeconfig::read() {
            Ok(kubeconfig) => {
                debug!(context = ?config.context, "Using kubeconfig");
                kube::Config::from_custom_kubeconfig(
                    kubeconfig,
                    &KubeConfigOptions {
                        context: config.context.clone(),
                        ..Default::default()
                    },
                )
                .await
                .with_context(|| match &config.context {
                    Some(ctx) => format!("Failed to load kubeconfig for context '{}'", ctx),
                    None => "Failed to load kubeconfig".to_string(),
                })?
            }
            Err(e) if config.context.is_some() => {
                return Err(e).context("Failed to read kubeconfig");
            }
            Err(e) => {
                debug!(error = %e, "No kubeconfig, using service environment");
                let host = std::env::var("KUBERNETES_SERVICE_HOST")
                    .context("No kubeconfig found and KUBERNETES_SERVICE_HOST is not set")?;
                let port = std::env::var("KUBERNETES_SERVICE_PORT")
                    .context("No kubeconfig found and KUBERNETES_SERVICE_PORT is not set")?;
                config_from_service_env(&host, &port)?
            }
        }
    };

    kube_config.connect_timeout = Some(config.connect_timeout());
    kube_config.read_timeout = Some(config.read_timeout());

    Client::try_from(kube_config).context("Failed to create Kubernetes client")
}

fn config_from_service_env(host: &str, port: &str) -> anyhow::Result<kube::Config> {
    use anyhow::Context;

    let url = format!("http://{}:{}", host, port);
    let uri = url
        .parse::<http::Uri>()
        .with_context(|| format!("Invalid API server address: {}", url))?;
    Ok(kube::Config::new(uri))
}

/// Generic namespaced CRUD for the kinds of one API group.
///
/// Every kind goes through the same code path; the per-kind difference is
/// entirely in its [`KindDescriptor`].
#[derive(Clone)]
pub struct GroupClient {
    client: Client,
    group: ApiGroup,
    registry: Arc<KindRegistry>,
    limiter: RequestLimiter,
}

impl std::fmt::Debug for GroupClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupClient")
            .field("group", &self.group)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl GroupClient {
    /// Create a client for `group`, failing if the API server does not serve it
    #[instrument(skip_all, fields(group = %group))]
    pub async fn connect(
        client: Client,
        group: ApiGroup,
        registry: Arc<KindRegistry>,
        limiter: RequestLimiter,
    ) -> Result<Self> {
        let api_version = group.api_version();
        limiter.acquire().await;
        let resources = client
            .list_api_group_resources(&api_version)
            .await
            .map_err(|e| {
                let status = match &e {
                    kube::Error::Api(resp) => Some(resp.code),
                    _ => None,
                };
                MeshError::Transport {
                    status,
                    message: format!("API group {} is not available: {}", api_version, e),
                }
            })?;

        let kinds: Vec<_> = registry.kinds_in(group).iter().map(|d| d.kind).collect();
        debug!(
            api_version = %api_version,
            resources = resources.resources.len(),
            kinds = ?kinds,
            "API group available"
        );
        Ok(Self::new(client, group, registry, limiter))
    }

    /// Create a client without probing the API group
    pub(crate) fn new(
        client: Client,
        group: ApiGroup,
        registry: Arc<KindRegistry>,
        limiter: RequestLimiter,
    ) -> Self {
        Self {
            client,
            group,
            registry,
            limiter,
        }
    }

    pub fn group(&self) -> ApiGroup {
        self.group
    }

    /// Descriptor of `kind`, which must be registered under this client's group
    fn descriptor(&self, kind: &str) -> Result<&KindDescriptor> {
        self.registry
            .get(kind)
            .filter(|d| d.group == self.group)
            .ok_or_else(|| MeshError::unsupported(kind))
    }

    fn api(&self, namespace: &str, descriptor: &KindDescriptor) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &descriptor.api_resource())
    }

    /// List every object of `kind` in `namespace`.
    ///
    /// A collection the server does not know (404) lists as empty.
    pub async fn list(&self, namespace: &str, kind: &str) -> Result<Vec<ConfigObject>> {
        let descriptor = self.descriptor(kind)?;
        let api = self.api(namespace, descriptor);
        let target = NamespacedObjectRef::new(namespace, kind, "");

        debug!(
            namespace = %namespace,
            kind = %kind,
            plural = %descriptor.plural,
            api_version = %descriptor.api_version(),
            "Listing mesh objects"
        );

        let params = ListParams::default();
        let list: ObjectList<DynamicObject> =
            match self.send(&target, api.list(&params)).await {
                Ok(list) => list,
                Err(e) if e.is_not_found() => {
                    debug!(namespace = %namespace, kind = %kind, "Collection not served, empty");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };

        list.items
            .into_iter()
            .map(|item| decode_item(descriptor, item))
            .collect()
    }

    pub async fn get(&self, target: &NamespacedObjectRef) -> Result<ConfigObject> {
        let descriptor = self.descriptor(&target.kind)?;
        let api = self.api(&target.namespace, descriptor);

        debug!(target = %target, "Fetching mesh object");
        let object = self.send(target, api.get(&target.name)).await?;
        decode_item(descriptor, object)
    }

    /// Create an object from a raw payload. `apiVersion` and `kind` are
    /// filled in from the registry; the namespace comes from the request.
    pub async fn create(
        &self,
        namespace: &str,
        kind: &str,
        payload: Value,
    ) -> Result<ConfigObject> {
        let descriptor = self.descriptor(kind)?;
        let object = to_dynamic(descriptor, payload)?;
        let target = NamespacedObjectRef::new(
            namespace,
            kind,
            object.metadata.name.clone().unwrap_or_default(),
        );
        let api = self.api(namespace, descriptor);

        let created = self
            .send(&target, api.create(&PostParams::default(), &object))
            .await?;

        info!(target = %target, "Created mesh object");
        decode_item(descriptor, created)
    }

    /// Write `object` back. The resource version it carries guards the write;
    /// an object without one is rejected before any request is made.
    pub async fn replace(&self, object: &ConfigObject) -> Result<ConfigObject> {
        let descriptor = self.descriptor(object.kind())?;
        let namespace = object
            .namespace()
            .unwrap_or_else(|| self.client.default_namespace());
        let target = NamespacedObjectRef::new(namespace, descriptor.kind, object.name());

        if object.resource_version().is_none() {
            return Err(MeshError::Conflict {
                target,
                message: "object carries no resourceVersion".to_string(),
            });
        }

        let envelope = object
            .to_envelope(&descriptor.api_version())
            .map_err(|source| MeshError::Decode {
                kind: descriptor.kind.to_string(),
                source,
            })?;
        let dynamic = to_dynamic(descriptor, envelope)?;
        let api = self.api(namespace, descriptor);

        let written = self
            .send(&target, api.replace(&target.name, &PostParams::default(), &dynamic))
            .await?;

        debug!(
            target = %target,
            resource_version = ?written.metadata.resource_version,
            "Replaced mesh object"
        );
        decode_item(descriptor, written)
    }

    /// Run one throttled request. Failures are mapped, never retried.
    async fn send<T, Fut>(&self, target: &NamespacedObjectRef, request: Fut) -> Result<T>
    where
        Fut: Future<Output = kube::Result<T>>,
    {
        self.limiter.acquire().await;
        request.await.map_err(|e| {
            debug!(target = %target, error = %e, "Request failed");
            MeshError::from_kube(e, target)
        })
    }
}

/// Decode a fetched object through the kind's registered decode function.
/// List items arrive without apiVersion/kind, so both are injected first.
fn decode_item(descriptor: &KindDescriptor, object: DynamicObject) -> Result<ConfigObject> {
    let decode_err = |source: serde_json::Error| MeshError::Decode {
        kind: descriptor.kind.to_string(),
        source,
    };

    let mut value = serde_json::to_value(object).map_err(decode_err)?;
    if let Value::Object(ref mut map) = value {
        map.insert(
            "apiVersion".to_string(),
            Value::String(descriptor.api_version()),
        );
        map.insert(
            "kind".to_string(),
            Value::String(descriptor.kind.to_string()),
        );
    }
    (descriptor.decode)(value).map_err(decode_err)
}

fn to_dynamic(descriptor: &KindDescriptor, mut payload: Value) -> Result<DynamicObject> {
    if let Value::Object(ref mut map) = payload {
        map.insert(
            "apiVersion".to_string(),
            Value::String(descriptor.api_version()),
        );
        map.insert(
            "kind".to_string(),
            Value::String(descriptor.kind.to_string()),
        );
    }
    serde_json::from_value(payload).map_err(|source| MeshError::Decode {
        kind: descriptor.kind.to_string(),
        source,
    })
}

/// Config source over both mesh API groups, dispatching on each kind's group
#[derive(Debug, Clone)]
pub struct IstioClient {
    config_api: GroupClient,
    networking_api: GroupClient,
    registry: Arc<KindRegistry>,
}

impl IstioClient {
    /// Connect both group clients concurrently; either group missing is an error
    pub async fn connect(
        client: Client,
        registry: Arc<KindRegistry>,
        limiter: RequestLimiter,
    ) -> Result<Self> {
        let (config_api, networking_api) = tokio::try_join!(
            GroupClient::connect(
                client.clone(),
                ApiGroup::Config,
                registry.clone(),
                limiter.clone()
            ),
            GroupClient::connect(client, ApiGroup::Networking, registry.clone(), limiter),
        )?;
        Ok(Self {
            config_api,
            networking_api,
            registry,
        })
    }

    pub(crate) fn new(client: Client, registry: Arc<KindRegistry>, limiter: RequestLimiter) -> Self {
        Self {
            config_api: GroupClient::new(
                client.clone(),
                ApiGroup::Config,
                registry.clone(),
                limiter.clone(),
            ),
            networking_api: GroupClient::new(client, ApiGroup::Networking, registry.clone(), limiter),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    fn group_client(&self, kind: &str) -> Result<&GroupClient> {
        let descriptor = self
            .registry
            .get(kind)
            .ok_or_else(|| MeshError::unsupported(kind))?;
        Ok(match descriptor.group {
            ApiGroup::Config => &self.config_api,
            ApiGroup::Networking => &self.networking_api,
        })
    }
}

#[async_trait]
impl ConfigSource for IstioClient {
    async fn list(&self, namespace: &str, kind: &str) -> Result<Vec<ConfigObject>> {
        self.group_client(kind)?.list(namespace, kind).await
    }

    async fn get(&self, target: &NamespacedObjectRef) -> Result<ConfigObject> {
        self.group_client(&target.kind)?.get(target).await
    }

    async fn create(&self, namespace: &str, kind: &str, payload: Value) -> Result<ConfigObject> {
        self.group_client(kind)?
            .create(namespace, kind, payload)
            .await
    }

    async fn replace(&self, object: &ConfigObject) -> Result<ConfigObject> {
        self.group_client(object.kind())?.replace(object).await
    }
}
