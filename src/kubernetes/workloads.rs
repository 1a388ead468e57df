// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Typed access to the core workload objects used for topology correlation.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Pod, Service};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use super::NamespacedObjectRef;
use super::throttle::RequestLimiter;
use crate::error::{MeshError, Result};
use crate::topology::{DeploymentSummary, PodSummary, ServiceSummary, WorkloadSource};

/// [`WorkloadSource`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeWorkloads {
    client: Client,
    limiter: RequestLimiter,
}

impl KubeWorkloads {
    pub fn new(client: Client, limiter: RequestLimiter) -> Self {
        Self { client, limiter }
    }
}

#[async_trait]
impl WorkloadSource for KubeWorkloads {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSummary> {
        let target = NamespacedObjectRef::new(namespace, "Service", name);
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);

        self.limiter.acquire().await;
        let svc = api
            .get(name)
            .await
            .map_err(|e| MeshError::from_kube(e, &target))?;
        Ok(ServiceSummary::from(&svc))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>> {
        let target = NamespacedObjectRef::new(namespace, "Pod", "");
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        self.limiter.acquire().await;
        let pods = api
            .list(&ListParams::default())
            .await
            .map_err(|e| MeshError::from_kube(e, &target))?;
        debug!(namespace = %namespace, count = pods.items.len(), "Listed pods");
        Ok(pods.items.iter().map(PodSummary::from).collect())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentSummary>> {
        let target = NamespacedObjectRef::new(namespace, "Deployment", "");
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);

        self.limiter.acquire().await;
        let deployments = api
            .list(&ListParams::default())
            .await
            .map_err(|e| MeshError::from_kube(e, &target))?;
        debug!(
            namespace = %namespace,
            count = deployments.items.len(),
            "Listed deployments"
        );
        Ok(deployments.items.iter().map(DeploymentSummary::from).collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let target = NamespacedObjectRef::new("", "Namespace", "");
        let api: Api<Namespace> = Api::all(self.client.clone());

        self.limiter.acquire().await;
        let namespaces = api
            .list(&ListParams::default())
            .await
            .map_err(|e| MeshError::from_kube(e, &target))?;
        Ok(namespaces
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{mock_client, respond, status_body};
    use serde_json::json;

    #[tokio::test]
    async fn test_list_deployments_uses_apps_group() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().path(),
                "/apis/apps/v1/namespaces/bookinfo/deployments"
            );
            send.send_response(respond(
                200,
                json!({
                    "apiVersion": "apps/v1",
                    "kind": "DeploymentList",
                    "metadata": {},
                    "items": [{
                        "metadata": {"name": "reviews-v1", "namespace": "bookinfo", "labels": {"app": "reviews"}},
                        "spec": {
                            "selector": {"matchLabels": {"app": "reviews", "version": "v1"}},
                            "template": {"metadata": {"labels": {"app": "reviews", "version": "v1"}}}
                        }
                    }]
                }),
            ));
        });

        let workloads = KubeWorkloads::new(client, RequestLimiter::unlimited());
        let deployments = workloads.list_deployments("bookinfo").await.unwrap();
        server.await.unwrap();

        assert_eq!(deployments.len(), 1);
        assert_eq!(deployments[0].name, "reviews-v1");
        assert!(deployments[0].selector.is_some());
    }

    #[tokio::test]
    async fn test_missing_service_is_not_found() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(
                request.uri().path(),
                "/api/v1/namespaces/bookinfo/services/ghost"
            );
            send.send_response(respond(
                404,
                status_body(404, "NotFound", "services \"ghost\" not found"),
            ));
        });

        let workloads = KubeWorkloads::new(client, RequestLimiter::unlimited());
        let err = workloads.get_service("bookinfo", "ghost").await.unwrap_err();
        server.await.unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_namespaces() {
        let (client, mut handle) = mock_client();
        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.uri().path(), "/api/v1/namespaces");
            send.send_response(respond(
                200,
                json!({
                    "apiVersion": "v1",
                    "kind": "NamespaceList",
                    "metadata": {},
                    "items": [
                        {"metadata": {"name": "bookinfo"}},
                        {"metadata": {"name": "istio-system"}}
                    ]
                }),
            ));
        });

        let workloads = KubeWorkloads::new(client, RequestLimiter::unlimited());
        let namespaces = workloads.list_namespaces().await.unwrap();
        server.await.unwrap();
        assert_eq!(namespaces, vec!["bookinfo", "istio-system"]);
    }
}
