// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Service-mesh configuration listing, route switching and service topology
//! correlation for Kubernetes.

pub mod cli;
pub mod config;
pub mod error;
pub mod kubernetes;
pub mod mesh;
pub mod output;
pub mod topology;

#[cfg(test)]
mod test_utils;

pub use error::{MeshError, Result};
