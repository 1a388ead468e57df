// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Kind registry for the service-mesh custom resources.
//!
//! Maps a kind name to its API coordinates and to the function that decodes
//! raw JSON into a typed [`ConfigObject`]. The registry is assembled once with
//! [`KindRegistryBuilder`] during startup and then frozen behind an `Arc`;
//! every group client shares the same instance, so decoding for a kind is
//! defined in exactly one place.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use kube::discovery::ApiResource;
use serde::Serialize;
use thiserror::Error;

use crate::mesh::objects::{
    self, ConfigObject, DestinationPolicy, DestinationRule, Rule, RouteRule, VirtualService,
};

/// Decodes a JSON object (apiVersion/kind/metadata/spec envelope) into a typed object
pub type DecodeFn = fn(serde_json::Value) -> Result<ConfigObject, serde_json::Error>;

/// API groups served by the mesh control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiGroup {
    /// config.istio.io: route rules, destination policies, mixer rules
    Config,
    /// networking.istio.io: virtual services, destination rules
    Networking,
}

impl ApiGroup {
    pub const ALL: [ApiGroup; 2] = [ApiGroup::Config, ApiGroup::Networking];

    pub fn group(&self) -> &'static str {
        match self {
            ApiGroup::Config => "config.istio.io",
            ApiGroup::Networking => "networking.istio.io",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            ApiGroup::Config => "v1alpha2",
            ApiGroup::Networking => "v1alpha3",
        }
    }

    /// Full group/version string (e.g. "networking.istio.io/v1alpha3")
    pub fn api_version(&self) -> String {
        format!("{}/{}", self.group(), self.version())
    }
}

impl fmt::Display for ApiGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.group())
    }
}

/// API coordinates and decoding rule for one registered kind
#[derive(Clone)]
pub struct KindDescriptor {
    /// Kind name as it appears in the object envelope (e.g. "VirtualService")
    pub kind: &'static str,
    pub group: ApiGroup,
    /// Collection name used in API paths (e.g. "virtualservices")
    pub plural: &'static str,
    pub decode: DecodeFn,
}

impl KindDescriptor {
    pub fn api_version(&self) -> String {
        self.group.api_version()
    }

    /// kube's dynamic resource handle for this kind
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.group().to_string(),
            version: self.group.version().to_string(),
            api_version: self.api_version(),
            kind: self.kind.to_string(),
            plural: self.plural.to_string(),
        }
    }
}

impl fmt::Debug for KindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDescriptor")
            .field("kind", &self.kind)
            .field("group", &self.group)
            .field("plural", &self.plural)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("kind `{0}` is registered twice")]
    DuplicateKind(String),
}

/// Collects descriptors during startup. Consumed by [`KindRegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct KindRegistryBuilder {
    by_kind: HashMap<&'static str, KindDescriptor>,
}

impl KindRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind. Registering the same kind name twice is a configuration error.
    pub fn register(&mut self, descriptor: KindDescriptor) -> Result<&mut Self, RegistryError> {
        if self.by_kind.contains_key(descriptor.kind) {
            return Err(RegistryError::DuplicateKind(descriptor.kind.to_string()));
        }
        self.by_kind.insert(descriptor.kind, descriptor);
        Ok(self)
    }

    /// Freeze the registry. No further registration is possible.
    pub fn build(self) -> Arc<KindRegistry> {
        Arc::new(KindRegistry {
            by_kind: self.by_kind,
        })
    }
}

/// Read-only registry of all known kinds
#[derive(Debug)]
pub struct KindRegistry {
    by_kind: HashMap<&'static str, KindDescriptor>,
}

impl KindRegistry {
    pub fn builder() -> KindRegistryBuilder {
        KindRegistryBuilder::new()
    }

    /// Look up a kind by name
    pub fn get(&self, kind: &str) -> Option<&KindDescriptor> {
        self.by_kind.get(kind)
    }

    /// All kinds served by one API group, sorted by kind name
    pub fn kinds_in(&self, group: ApiGroup) -> Vec<&KindDescriptor> {
        let mut kinds: Vec<_> = self
            .by_kind
            .values()
            .filter(|d| d.group == group)
            .collect();
        kinds.sort_by_key(|d| d.kind);
        kinds
    }

    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

/// Build the registry of mesh kinds known to this crate
pub fn mesh_registry() -> Result<Arc<KindRegistry>, RegistryError> {
    let mut builder = KindRegistry::builder();

    macro_rules! register_kind {
        ($type:ty, $group:expr, $plural:literal) => {{
            builder.register(KindDescriptor {
                kind: <$type as objects::MeshResource>::KIND,
                group: $group,
                plural: $plural,
                decode: objects::decode::<$type>,
            })?;
        }};
    }

    // config.istio.io/v1alpha2
    register_kind!(RouteRule, ApiGroup::Config, "routerules");
    register_kind!(DestinationPolicy, ApiGroup::Config, "destinationpolicies");
    register_kind!(Rule, ApiGroup::Config, "rules");

    // networking.istio.io/v1alpha3
    register_kind!(VirtualService, ApiGroup::Networking, "virtualservices");
    register_kind!(DestinationRule, ApiGroup::Networking, "destinationrules");

    Ok(builder.build())
}
