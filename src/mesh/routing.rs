// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Route switching: rewrite a routing rule so that all traffic goes to one
//! version of the destination service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::objects::{
    ConfigObject, Destination, DestinationWeight, HttpRoute, HttpRouteDestination, MeshResource,
    VirtualService,
};
use crate::error::{MeshError, Result};
use crate::kubernetes::NamespacedObjectRef;

/// Label identifying a workload version
pub const VERSION_LABEL: &str = "version";

/// Which rule to switch and which version receives the traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSwitch {
    /// Name of the routing rule to rewrite
    pub name: String,
    /// Target version (a `version` label value, or a destination subset name)
    pub version: String,
}

impl RouteSwitch {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Compute the updated rule sending 100% of traffic to `version`.
///
/// Metadata (including the resource version read with the object) is kept
/// untouched so the write can be checked against it.
///
/// A VirtualService in which no HTTP route can be pointed at the version
/// (TCP/TLS only, or only redirects) is `Unroutable`.
pub fn route_all_traffic(object: ConfigObject, version: &str) -> Result<ConfigObject> {
    match object {
        ConfigObject::RouteRule(mut rule) => {
            let mut labels: BTreeMap<String, String> = rule
                .spec
                .route
                .first()
                .map(|r| r.labels.clone())
                .unwrap_or_default();
            labels.insert(VERSION_LABEL.to_string(), version.to_string());
            rule.spec.route = vec![DestinationWeight {
                labels,
                weight: Some(100),
                ..Default::default()
            }];
            Ok(ConfigObject::RouteRule(rule))
        }
        ConfigObject::VirtualService(mut vs) => {
            let default_host = vs.spec.hosts.first().cloned();
            let mut rewritten = 0;
            for http in &mut vs.spec.http {
                if answers_directly(http) {
                    continue;
                }
                let destination = match http.route.first() {
                    Some(first) => Destination {
                        host: first.destination.host.clone(),
                        subset: Some(version.to_string()),
                        port: first.destination.port.clone(),
                    },
                    None => match &default_host {
                        Some(host) => Destination {
                            host: host.clone(),
                            subset: Some(version.to_string()),
                            port: None,
                        },
                        None => continue,
                    },
                };
                http.route = vec![HttpRouteDestination {
                    destination,
                    weight: Some(100),
                    ..Default::default()
                }];
                rewritten += 1;
            }

            if rewritten == 0 {
                let target = NamespacedObjectRef::new(
                    vs.namespace().unwrap_or_default(),
                    VirtualService::KIND,
                    vs.name(),
                );
                return Err(MeshError::Unroutable {
                    target,
                    reason: "no HTTP route forwards to a destination".to_string(),
                });
            }
            Ok(ConfigObject::VirtualService(vs))
        }
        other => Err(MeshError::unsupported(other.kind())),
    }
}

/// HTTP routes answered by the proxy itself cannot also carry a `route`
fn answers_directly(http: &HttpRoute) -> bool {
    http.route.is_empty()
        && ["redirect", "directResponse", "delegate"]
            .iter()
            .any(|key| http.extra.contains_key(*key))
}
