//! Common test utilities.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector as K8sLabelSelector;
use kube::Client;
use kube::client::Body;
use serde_json::{Value, json};

use crate::error::{MeshError, Result};
use crate::kubernetes::registry::mesh_registry;
use crate::kubernetes::{KindRegistry, NamespacedObjectRef};
use crate::mesh::ConfigSource;
use crate::mesh::objects::ConfigObject;
use crate::topology::{DeploymentSummary, PodSummary, ServiceSummary, WorkloadSource};

pub type MockHandle = tower_test::mock::Handle<http::Request<Body>, http::Response<Body>>;

/// A kube client wired to a mock service. Requests are answered through the handle.
pub fn mock_client() -> (Client, MockHandle) {
    let (service, handle) = tower_test::mock::pair::<http::Request<Body>, http::Response<Body>>();
    (Client::new(service, "default"), handle)
}

pub fn respond(status: u16, body: Value) -> http::Response<Body> {
    http::Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// API server `Status` body for an error response
pub fn status_body(code: u16, reason: &str, message: &str) -> Value {
    json!({
        "kind": "Status",
        "apiVersion": "v1",
        "metadata": {},
        "status": "Failure",
        "message": message,
        "reason": reason,
        "code": code
    })
}

/// In-memory [`ConfigSource`] with failure injection.
///
/// Writes follow the API server's optimistic concurrency rules: a replace
/// must carry the stored resource version, and bumps it on success.
pub struct FakeConfigSource {
    registry: Arc<KindRegistry>,
    objects: Mutex<Vec<ConfigObject>>,
    failing: HashSet<String>,
    modify_before_replace: bool,
    listed: Mutex<Vec<String>>,
    replaces: AtomicUsize,
}

impl FakeConfigSource {
    pub fn new() -> Self {
        Self {
            registry: mesh_registry().unwrap(),
            objects: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            modify_before_replace: false,
            listed: Mutex::new(Vec::new()),
            replaces: AtomicUsize::new(0),
        }
    }

    /// Add an object given as a full envelope (kind decides the type)
    pub fn with_object(self, envelope: Value) -> Self {
        let kind = envelope["kind"].as_str().unwrap().to_string();
        let descriptor = self.registry.get(&kind).unwrap();
        let object = (descriptor.decode)(envelope).unwrap();
        self.objects.lock().unwrap().push(object);
        self
    }

    /// Every list or get of `kind` fails with a 503
    pub fn fail_kind(mut self, kind: &str) -> Self {
        self.failing.insert(kind.to_string());
        self
    }

    /// Simulate another writer updating the object between our read and write
    pub fn modify_before_replace(mut self) -> Self {
        self.modify_before_replace = true;
        self
    }

    /// Kinds passed to `list`, in call order
    pub fn listed_kinds(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }

    pub fn replace_attempts(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    fn check_kind(&self, kind: &str) -> Result<()> {
        if self.registry.get(kind).is_none() {
            return Err(MeshError::unsupported(kind));
        }
        if self.failing.contains(kind) {
            return Err(MeshError::Transport {
                status: Some(503),
                message: format!("{} unavailable", kind),
            });
        }
        Ok(())
    }

    fn position(objects: &[ConfigObject], target: &NamespacedObjectRef) -> Option<usize> {
        objects.iter().position(|o| {
            o.kind() == target.kind
                && o.namespace() == Some(target.namespace.as_str())
                && o.name() == target.name
        })
    }
}

fn bump(version: Option<&str>) -> String {
    let current = version.and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl ConfigSource for FakeConfigSource {
    async fn list(&self, namespace: &str, kind: &str) -> Result<Vec<ConfigObject>> {
        self.listed.lock().unwrap().push(kind.to_string());
        self.check_kind(kind)?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.kind() == kind && o.namespace() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get(&self, target: &NamespacedObjectRef) -> Result<ConfigObject> {
        self.check_kind(&target.kind)?;
        let objects = self.objects.lock().unwrap();
        Self::position(&objects, target)
            .map(|i| objects[i].clone())
            .ok_or_else(|| MeshError::NotFound {
                target: target.clone(),
            })
    }

    async fn create(&self, namespace: &str, kind: &str, mut payload: Value) -> Result<ConfigObject> {
        self.check_kind(kind)?;
        payload["kind"] = json!(kind);
        payload["metadata"]["namespace"] = json!(namespace);
        payload["metadata"]["resourceVersion"] = json!("1");
        let descriptor = self.registry.get(kind).unwrap();
        let object = (descriptor.decode)(payload).map_err(|source| MeshError::Decode {
            kind: kind.to_string(),
            source,
        })?;

        let target = NamespacedObjectRef::new(namespace, kind, object.name());
        let mut objects = self.objects.lock().unwrap();
        if Self::position(&objects, &target).is_some() {
            return Err(MeshError::Conflict {
                target,
                message: "already exists".to_string(),
            });
        }
        objects.push(object.clone());
        Ok(object)
    }

    async fn replace(&self, object: &ConfigObject) -> Result<ConfigObject> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        let target = NamespacedObjectRef::new(
            object.namespace().unwrap_or_default(),
            object.kind(),
            object.name(),
        );

        let mut objects = self.objects.lock().unwrap();
        let index = Self::position(&objects, &target).ok_or_else(|| MeshError::NotFound {
            target: target.clone(),
        })?;

        if self.modify_before_replace {
            let stored = &mut objects[index];
            let next = bump(stored.resource_version());
            stored.metadata_mut().resource_version = Some(next);
        }

        if objects[index].resource_version() != object.resource_version() {
            return Err(MeshError::Conflict {
                target,
                message: "the object has been modified".to_string(),
            });
        }

        let mut written = object.clone();
        written.metadata_mut().resource_version = Some(bump(object.resource_version()));
        objects[index] = written.clone();
        Ok(written)
    }
}

/// Mesh configuration of the bookinfo sample plus one rule in istio-system
pub fn bookinfo_config() -> FakeConfigSource {
    FakeConfigSource::new()
        .with_object(json!({
            "apiVersion": "config.istio.io/v1alpha2",
            "kind": "RouteRule",
            "metadata": {"name": "reviews-default", "namespace": "bookinfo", "resourceVersion": "1"},
            "spec": {
                "destination": {"name": "reviews"},
                "precedence": 1,
                "route": [{"labels": {"version": "v1"}, "weight": 100}]
            }
        }))
        .with_object(json!({
            "apiVersion": "config.istio.io/v1alpha2",
            "kind": "DestinationPolicy",
            "metadata": {"name": "reviews-cb", "namespace": "bookinfo", "resourceVersion": "2"},
            "spec": {
                "destination": {"name": "reviews", "labels": {"version": "v1"}},
                "circuitBreaker": {"simpleCb": {"maxConnections": 100}}
            }
        }))
        .with_object(json!({
            "apiVersion": "networking.istio.io/v1alpha3",
            "kind": "VirtualService",
            "metadata": {"name": "reviews", "namespace": "bookinfo", "resourceVersion": "3"},
            "spec": {
                "hosts": ["reviews"],
                "http": [{"route": [{"destination": {"host": "reviews", "subset": "v1"}}]}]
            }
        }))
        .with_object(json!({
            "apiVersion": "networking.istio.io/v1alpha3",
            "kind": "VirtualService",
            "metadata": {"name": "details", "namespace": "bookinfo", "resourceVersion": "4"},
            "spec": {
                "hosts": ["details"],
                "http": [{"route": [{"destination": {"host": "details", "subset": "v1"}}]}]
            }
        }))
        .with_object(json!({
            "apiVersion": "networking.istio.io/v1alpha3",
            "kind": "DestinationRule",
            "metadata": {"name": "reviews", "namespace": "bookinfo", "resourceVersion": "5"},
            "spec": {
                "host": "reviews",
                "subsets": [
                    {"name": "v1", "labels": {"version": "v1"}},
                    {"name": "v2", "labels": {"version": "v2"}}
                ]
            }
        }))
        .with_object(json!({
            "apiVersion": "config.istio.io/v1alpha2",
            "kind": "rule",
            "metadata": {"name": "denyreviewsv3", "namespace": "bookinfo", "resourceVersion": "6"},
            "spec": {
                "match": "destination.labels[\"app\"] == \"ratings\"",
                "actions": [{"handler": "denyreviewsv3handler.denier"}]
            }
        }))
        .with_object(json!({
            "apiVersion": "config.istio.io/v1alpha2",
            "kind": "rule",
            "metadata": {"name": "promhttp", "namespace": "istio-system", "resourceVersion": "7"},
            "spec": {
                "match": "context.protocol == \"http\"",
                "actions": [{"handler": "handler.prometheus"}]
            }
        }))
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn service(name: &str, selector: &[(&str, &str)]) -> ServiceSummary {
    ServiceSummary {
        name: name.to_string(),
        namespace: "bookinfo".to_string(),
        selector: labels(selector),
    }
}

pub fn pod(name: &str, pod_labels: &[(&str, &str)]) -> PodSummary {
    PodSummary {
        name: name.to_string(),
        namespace: "bookinfo".to_string(),
        labels: labels(pod_labels),
    }
}

/// Deployment with its own labels and an optional `matchLabels` selector
pub fn deployment(
    name: &str,
    own_labels: &[(&str, &str)],
    selector: Option<&[(&str, &str)]>,
) -> DeploymentSummary {
    DeploymentSummary {
        name: name.to_string(),
        namespace: "bookinfo".to_string(),
        labels: labels(own_labels),
        selector: selector.map(|s| K8sLabelSelector {
            match_labels: Some(labels(s)),
            match_expressions: None,
        }),
    }
}

/// In-memory [`WorkloadSource`] for a single namespace
pub struct FakeWorkloads {
    services: Vec<ServiceSummary>,
    pods: Vec<PodSummary>,
    deployments: Vec<DeploymentSummary>,
}

impl FakeWorkloads {
    pub fn new(
        services: Vec<ServiceSummary>,
        pods: Vec<PodSummary>,
        deployments: Vec<DeploymentSummary>,
    ) -> Self {
        Self {
            services,
            pods,
            deployments,
        }
    }
}

#[async_trait]
impl WorkloadSource for FakeWorkloads {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSummary> {
        self.services
            .iter()
            .find(|s| s.namespace == namespace && s.name == name)
            .cloned()
            .ok_or_else(|| MeshError::NotFound {
                target: NamespacedObjectRef::new(namespace, "Service", name),
            })
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        Ok(self
            .pods
            .iter()
            .filter(|p| p.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentSummary>> {
        Ok(self
            .deployments
            .iter()
            .filter(|d| d.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        Ok(vec!["bookinfo".to_string()])
    }
}
