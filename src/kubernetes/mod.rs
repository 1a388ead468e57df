mod client;
pub mod registry;
mod throttle;
mod workloads;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{GroupClient, IstioClient, build_client};
pub use registry::{ApiGroup, KindDescriptor, KindRegistry, KindRegistryBuilder, RegistryError};
pub use throttle::{DEFAULT_BURST, DEFAULT_QPS, RateLimit, RequestLimiter};
pub use workloads::KubeWorkloads;

/// Lookup key for a single namespaced object. Carries no ownership of the
/// object it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacedObjectRef {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl NamespacedObjectRef {
    pub fn new(
        namespace: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}
