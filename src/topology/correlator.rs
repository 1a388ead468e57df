// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Service -> deployment correlation.
//!
//! The platform stores no edge between a service and the deployments behind
//! it, so the edge is inferred from labels:
//!
//! 1. pods matching the service selector;
//! 2. deployments whose own selector matches at least one of those pods;
//! 3. for the remaining deployments, the service selector matched directly
//!    against the deployment's labels. This last step is a best-effort guess
//!    for deployments with no live pods (scaled to zero, not yet reconciled)
//!    and can both over- and under-match.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector as K8sLabelSelector;
use serde::Serialize;
use tracing::{debug, warn};

use super::selector::LabelSelector;
use crate::error::Result;
use crate::mesh::routing::VERSION_LABEL;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub namespace: String,
    /// `spec.selector`; plain key/value pairs
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PodSummary {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeploymentSummary {
    pub name: String,
    pub namespace: String,
    /// The deployment's own labels
    pub labels: BTreeMap<String, String>,
    /// Pod template selector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<K8sLabelSelector>,
}

impl From<&Service> for ServiceSummary {
    fn from(svc: &Service) -> Self {
        Self {
            name: svc.metadata.name.clone().unwrap_or_default(),
            namespace: svc.metadata.namespace.clone().unwrap_or_default(),
            selector: svc
                .spec
                .as_ref()
                .and_then(|s| s.selector.clone())
                .unwrap_or_default(),
        }
    }
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        Self {
            name: pod.metadata.name.clone().unwrap_or_default(),
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            labels: pod.metadata.labels.clone().unwrap_or_default(),
        }
    }
}

impl From<&Deployment> for DeploymentSummary {
    fn from(deploy: &Deployment) -> Self {
        Self {
            name: deploy.metadata.name.clone().unwrap_or_default(),
            namespace: deploy.metadata.namespace.clone().unwrap_or_default(),
            labels: deploy.metadata.labels.clone().unwrap_or_default(),
            selector: deploy.spec.as_ref().map(|s| s.selector.clone()),
        }
    }
}

impl DeploymentSummary {
    /// The deployment's own pod selector
    pub fn pod_selector(&self) -> Result<LabelSelector> {
        Ok(LabelSelector::from_k8s(self.selector.as_ref())?)
    }
}

/// Pods whose labels satisfy `selector`. The empty selector yields no pods.
pub fn filter_pods_for_selector<'a>(
    selector: &LabelSelector,
    pods: &'a [PodSummary],
) -> Vec<&'a PodSummary> {
    pods.iter().filter(|p| selector.matches(&p.labels)).collect()
}

/// Pods behind a service, optionally narrowed to one `version` label value
pub fn filter_pods_for_service(
    service: Option<&ServiceSummary>,
    pods: Option<&[PodSummary]>,
    version: Option<&str>,
) -> Vec<PodSummary> {
    let (Some(service), Some(pods)) = (service, pods) else {
        return Vec::new();
    };
    let mut selector_labels = service.selector.clone();
    if let Some(version) = version.filter(|_| !selector_labels.is_empty()) {
        selector_labels.insert(VERSION_LABEL.to_string(), version.to_string());
    }
    let selector = LabelSelector::from_labels(&selector_labels);
    filter_pods_for_selector(&selector, pods)
        .into_iter()
        .cloned()
        .collect()
}

/// Deployments backing `service`, in input order, without duplicates.
///
/// Absent inputs yield an empty result. A deployment with a malformed
/// selector is logged and skipped.
pub fn filter_deployments_for_service(
    service: Option<&ServiceSummary>,
    pods: Option<&[PodSummary]>,
    deployments: Option<&[DeploymentSummary]>,
) -> Vec<DeploymentSummary> {
    let (Some(service), Some(pods), Some(deployments)) = (service, pods, deployments) else {
        return Vec::new();
    };

    let service_selector = LabelSelector::from_labels(&service.selector);
    let service_pods = filter_pods_for_selector(&service_selector, pods);

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut matched = Vec::new();

    for deploy in deployments {
        let selector = match deploy.pod_selector() {
            Ok(selector) => selector,
            Err(e) => {
                warn!(
                    deployment = %deploy.name,
                    namespace = %deploy.namespace,
                    error = %e,
                    "Skipping deployment with malformed selector"
                );
                continue;
            }
        };

        let owns_live_pod = service_pods.iter().any(|p| selector.matches(&p.labels));
        // No live pod (yet): guess from the deployment's own labels
        let included = owns_live_pod || service_selector.matches(&deploy.labels);

        if included && seen.insert((deploy.namespace.as_str(), deploy.name.as_str())) {
            debug!(
                service = %service.name,
                deployment = %deploy.name,
                via_pods = owns_live_pod,
                "Correlated deployment"
            );
            matched.push(deploy.clone());
        }
    }

    matched
}

/// Source of the plain workload objects needed for correlation
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<ServiceSummary>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>>;

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentSummary>>;

    async fn list_namespaces(&self) -> Result<Vec<String>>;
}

/// Correlation entry points over a [`WorkloadSource`]
pub struct TopologyService<W> {
    source: W,
}

impl<W: WorkloadSource> TopologyService<W> {
    pub fn new(source: W) -> Self {
        Self { source }
    }

    /// Deployments backing the named service
    pub async fn service_deployments(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Vec<DeploymentSummary>> {
        let (service, pods, deployments) = tokio::try_join!(
            self.source.get_service(namespace, service),
            self.source.list_pods(namespace),
            self.source.list_deployments(namespace),
        )?;
        Ok(filter_deployments_for_service(
            Some(&service),
            Some(&pods),
            Some(&deployments),
        ))
    }

    /// Pods behind the named service, optionally one version only
    pub async fn service_pods(
        &self,
        namespace: &str,
        service: &str,
        version: Option<&str>,
    ) -> Result<Vec<PodSummary>> {
        let (service, pods) = tokio::try_join!(
            self.source.get_service(namespace, service),
            self.source.list_pods(namespace),
        )?;
        Ok(filter_pods_for_service(Some(&service), Some(&pods), version))
    }

    pub async fn namespaces(&self) -> Result<Vec<String>> {
        self.source.list_namespaces().await
    }
}
