// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Config aggregation: realize a [`ConfigCriteria`] into one consistent
//! snapshot, look up single objects, and switch routes.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::objects::{
    ConfigObject, DestinationPolicy, DestinationRule, Rule, RouteRule, VirtualService,
};
use super::routing::{RouteSwitch, route_all_traffic};
use super::{Category, ConfigCriteria};
use crate::error::{MeshError, Result};
use crate::kubernetes::NamespacedObjectRef;

/// Namespaced access to registered mesh kinds
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// List all objects of `kind` in `namespace`. Never fails with `NotFound`.
    async fn list(&self, namespace: &str, kind: &str) -> Result<Vec<ConfigObject>>;

    async fn get(&self, target: &NamespacedObjectRef) -> Result<ConfigObject>;

    async fn create(
        &self,
        namespace: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<ConfigObject>;

    /// Write `object` back, guarded by its `metadata.resourceVersion`
    async fn replace(&self, object: &ConfigObject) -> Result<ConfigObject>;
}

/// Unified configuration snapshot of one namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IstioConfigList {
    pub namespace: String,
    pub route_rules: Vec<RouteRule>,
    pub destination_policies: Vec<DestinationPolicy>,
    pub virtual_services: Vec<VirtualService>,
    pub destination_rules: Vec<DestinationRule>,
    pub rules: Vec<Rule>,
}

impl IstioConfigList {
    fn push(&mut self, object: ConfigObject) {
        match object {
            ConfigObject::RouteRule(o) => self.route_rules.push(o),
            ConfigObject::DestinationPolicy(o) => self.destination_policies.push(o),
            ConfigObject::VirtualService(o) => self.virtual_services.push(o),
            ConfigObject::DestinationRule(o) => self.destination_rules.push(o),
            ConfigObject::Rule(o) => self.rules.push(o),
        }
    }

    /// Total number of objects across all categories
    pub fn len(&self) -> usize {
        self.route_rules.len()
            + self.destination_policies.len()
            + self.virtual_services.len()
            + self.destination_rules.len()
            + self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All objects, category by category
    pub fn objects(&self) -> Vec<ConfigObject> {
        let route_rules = self.route_rules.iter().cloned().map(ConfigObject::from);
        let policies = self.destination_policies.iter().cloned().map(ConfigObject::from);
        let virtual_services = self.virtual_services.iter().cloned().map(ConfigObject::from);
        let destination_rules = self.destination_rules.iter().cloned().map(ConfigObject::from);
        let rules = self.rules.iter().cloned().map(ConfigObject::from);
        route_rules
            .chain(policies)
            .chain(virtual_services)
            .chain(destination_rules)
            .chain(rules)
            .collect()
    }
}

pub struct ConfigAggregator<S> {
    source: S,
}

impl<S: ConfigSource> ConfigAggregator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every included category concurrently.
    ///
    /// Fails as soon as one category fails, naming it; the remaining fetches
    /// are dropped and no partial snapshot is returned.
    pub async fn get_config(&self, criteria: &ConfigCriteria) -> Result<IstioConfigList> {
        let namespace = criteria.namespace.as_str();
        let categories = criteria.included();

        debug!(
            namespace = %namespace,
            categories = ?categories,
            "Fetching mesh configuration"
        );

        let fetches = categories.iter().map(|&category| async move {
            self.source
                .list(namespace, category.kind())
                .await
                .map(|objects| (category, objects))
                .map_err(|e| {
                    warn!(
                        namespace = %namespace,
                        category = %category,
                        error = %e,
                        "Category fetch failed"
                    );
                    MeshError::Aggregate {
                        category,
                        source: Box::new(e),
                    }
                })
        });

        let results = try_join_all(fetches).await?;

        let mut list = IstioConfigList {
            namespace: namespace.to_string(),
            ..Default::default()
        };
        for (_, objects) in results {
            for object in objects {
                list.push(object);
            }
        }

        info!(
            namespace = %namespace,
            objects = list.len(),
            "Fetched mesh configuration"
        );
        Ok(list)
    }

    /// Fetch one object. `category` is the request-level name
    /// (e.g. "virtualservices"); unknown names fail before any fetch.
    pub async fn get_config_details(
        &self,
        namespace: &str,
        category: &str,
        name: &str,
    ) -> Result<ConfigObject> {
        let category: Category = category.parse()?;
        let target = NamespacedObjectRef::new(namespace, category.kind(), name);
        debug!(target = %target, "Fetching mesh object");
        self.source.get(&target).await
    }

    /// Read the routing rule named by `directive`, send all of its traffic to
    /// the target version and write it back.
    ///
    /// The rule is looked up in the included routable categories, in
    /// canonical order. The write carries the resource version that was read;
    /// a concurrent modification surfaces as `Conflict` and is not retried.
    pub async fn switch_route(
        &self,
        criteria: &ConfigCriteria,
        directive: &RouteSwitch,
    ) -> Result<ConfigObject> {
        let routable: Vec<Category> = criteria
            .included()
            .into_iter()
            .filter(Category::is_routable)
            .collect();

        let Some(&first) = routable.first() else {
            return Err(MeshError::NoRoutingCategory {
                requested: criteria.included(),
            });
        };

        let mut current = None;
        for category in &routable {
            let target =
                NamespacedObjectRef::new(&criteria.namespace, category.kind(), &directive.name);
            match self.source.get(&target).await {
                Ok(object) => {
                    current = Some(object);
                    break;
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        let Some(current) = current else {
            return Err(MeshError::NotFound {
                target: NamespacedObjectRef::new(
                    &criteria.namespace,
                    first.kind(),
                    &directive.name,
                ),
            });
        };

        let target =
            NamespacedObjectRef::new(&criteria.namespace, current.kind(), current.name());
        if current.resource_version().is_none() {
            return Err(MeshError::Conflict {
                target,
                message: "object carries no resourceVersion to guard the write".to_string(),
            });
        }

        let updated = route_all_traffic(current, &directive.version)?;
        let written = self.source.replace(&updated).await?;

        info!(
            target = %target,
            version = %directive.version,
            "Switched route"
        );
        Ok(written)
    }
}
