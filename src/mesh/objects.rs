// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Typed mesh configuration objects.
//!
//! Every kind is a flat `{metadata, spec}` carrier implementing
//! [`MeshResource`]. Spec fields this crate reasons about are typed; anything
//! else is kept in a flattened `extra` map so that a read-modify-write cycle
//! never drops fields we do not model.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Category;

/// Shared capability set of all mesh kinds
pub trait MeshResource: Serialize + DeserializeOwned + Into<ConfigObject> {
    /// Kind name in the object envelope
    const KIND: &'static str;

    type Spec;

    fn metadata(&self) -> &ObjectMeta;

    fn spec(&self) -> &Self::Spec;

    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }
}

/// Decode a JSON envelope into the typed object of kind `T`.
///
/// Used as the per-kind decode function of the kind registry.
pub fn decode<T: MeshResource>(value: Value) -> Result<ConfigObject, serde_json::Error> {
    serde_json::from_value::<T>(value).map(Into::into)
}

macro_rules! mesh_resource {
    ($type:ident, $spec:ty, $kind:literal) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $type {
            pub metadata: ObjectMeta,
            #[serde(default)]
            pub spec: $spec,
        }

        impl MeshResource for $type {
            const KIND: &'static str = $kind;
            type Spec = $spec;

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn spec(&self) -> &Self::Spec {
                &self.spec
            }
        }

        impl From<$type> for ConfigObject {
            fn from(obj: $type) -> Self {
                ConfigObject::$type(obj)
            }
        }
    };
}

mesh_resource!(RouteRule, RouteRuleSpec, "RouteRule");
mesh_resource!(DestinationPolicy, DestinationPolicySpec, "DestinationPolicy");
mesh_resource!(Rule, RuleSpec, "rule");
mesh_resource!(VirtualService, VirtualServiceSpec, "VirtualService");
mesh_resource!(DestinationRule, DestinationRuleSpec, "DestinationRule");

// === config.istio.io/v1alpha2 ===

/// Service reference used by route rules and destination policies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IstioService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One weighted backend of a route rule, selected by pod labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationWeight {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteRuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<IstioService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precedence: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<DestinationWeight>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationPolicySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<IstioService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<IstioService>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Mixer rule: a match expression and the actions it triggers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default, rename = "match", skip_serializing_if = "Option::is_none")]
    pub match_expr: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// === networking.istio.io/v1alpha3 ===

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRouteDestination {
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRoute {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<HttpRouteDestination>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpRoute>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subset {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationRuleSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subsets: Vec<Subset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Any decoded mesh object, one variant per registered kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigObject {
    RouteRule(RouteRule),
    DestinationPolicy(DestinationPolicy),
    Rule(Rule),
    VirtualService(VirtualService),
    DestinationRule(DestinationRule),
}

impl ConfigObject {
    pub fn kind(&self) -> &'static str {
        self.category().kind()
    }

    pub fn category(&self) -> Category {
        match self {
            ConfigObject::RouteRule(_) => Category::RouteRules,
            ConfigObject::DestinationPolicy(_) => Category::DestinationPolicies,
            ConfigObject::Rule(_) => Category::Rules,
            ConfigObject::VirtualService(_) => Category::VirtualServices,
            ConfigObject::DestinationRule(_) => Category::DestinationRules,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ConfigObject::RouteRule(o) => o.metadata(),
            ConfigObject::DestinationPolicy(o) => o.metadata(),
            ConfigObject::Rule(o) => o.metadata(),
            ConfigObject::VirtualService(o) => o.metadata(),
            ConfigObject::DestinationRule(o) => o.metadata(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ConfigObject::RouteRule(o) => &mut o.metadata,
            ConfigObject::DestinationPolicy(o) => &mut o.metadata,
            ConfigObject::Rule(o) => &mut o.metadata,
            ConfigObject::VirtualService(o) => &mut o.metadata,
            ConfigObject::DestinationRule(o) => &mut o.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Version token used for optimistic concurrency on writes
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    /// Spec as untyped JSON
    pub fn spec_value(&self) -> Value {
        let spec = match self {
            ConfigObject::RouteRule(o) => serde_json::to_value(&o.spec),
            ConfigObject::DestinationPolicy(o) => serde_json::to_value(&o.spec),
            ConfigObject::Rule(o) => serde_json::to_value(&o.spec),
            ConfigObject::VirtualService(o) => serde_json::to_value(&o.spec),
            ConfigObject::DestinationRule(o) => serde_json::to_value(&o.spec),
        };
        spec.unwrap_or(Value::Null)
    }

    /// Full JSON envelope including apiVersion and kind
    pub fn to_envelope(&self, api_version: &str) -> Result<Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            map.insert(
                "apiVersion".to_string(),
                Value::String(api_version.to_string()),
            );
            map.insert("kind".to_string(), Value::String(self.kind().to_string()));
        }
        Ok(value)
    }
}
