// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error taxonomy shared by the resource client, the config aggregator and
//! the topology correlator.

use thiserror::Error;

use crate::kubernetes::NamespacedObjectRef;
use crate::mesh::Category;
use crate::topology::SelectorError;

pub type Result<T, E = MeshError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MeshError {
    /// Kind (or category) that was never registered. A programming or
    /// configuration error rather than bad user input.
    #[error("unsupported kind `{kind}`")]
    UnsupportedKind { kind: String },

    #[error("{} not found", .target)]
    NotFound { target: NamespacedObjectRef },

    /// Optimistic concurrency violation, or a create over an existing object.
    #[error("conflict on {}: {message}", .target)]
    Conflict {
        target: NamespacedObjectRef,
        message: String,
    },

    /// Network, auth, TLS or non-2xx response from the API server.
    #[error("{}", transport_message(.status, .message))]
    Transport { status: Option<u16>, message: String },

    #[error(transparent)]
    MalformedSelector(#[from] SelectorError),

    /// A routing rule with nothing that can carry all traffic to one version.
    #[error("cannot switch {}: {reason}", .target)]
    Unroutable {
        target: NamespacedObjectRef,
        reason: String,
    },

    /// Route switching was asked to look only in non-routing categories.
    #[error("switching routes needs routerules or virtualservices, requested: {}", category_list(.requested))]
    NoRoutingCategory { requested: Vec<Category> },

    #[error("cannot decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// One category of a listing request failed; no partial snapshot exists.
    #[error("failed to fetch {category}: {source}")]
    Aggregate {
        category: Category,
        #[source]
        source: Box<MeshError>,
    },
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("API server returned {}: {}", code, message),
        None => format!("transport error: {}", message),
    }
}

fn category_list(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "none".to_string();
    }
    let names: Vec<_> = categories.iter().map(|c| c.as_str()).collect();
    names.join(", ")
}

impl MeshError {
    pub fn unsupported(kind: impl Into<String>) -> Self {
        MeshError::UnsupportedKind { kind: kind.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, MeshError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, MeshError::Conflict { .. })
    }

    /// Map a kube client error onto the taxonomy: 404 is `NotFound`, 409 is
    /// `Conflict`, everything else is `Transport` with the status message.
    pub fn from_kube(err: kube::Error, target: &NamespacedObjectRef) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => MeshError::NotFound {
                target: target.clone(),
            },
            kube::Error::Api(resp) if resp.code == 409 => MeshError::Conflict {
                target: target.clone(),
                message: resp.message,
            },
            kube::Error::Api(resp) => MeshError::Transport {
                status: Some(resp.code),
                message: resp.message,
            },
            other => MeshError::Transport {
                status: None,
                message: other.to_string(),
            },
        }
    }
}
