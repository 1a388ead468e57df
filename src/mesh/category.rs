// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! The five configuration categories and the criteria selecting among them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// A category of mesh configuration object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    RouteRules,
    DestinationPolicies,
    VirtualServices,
    DestinationRules,
    Rules,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::RouteRules,
        Category::DestinationPolicies,
        Category::VirtualServices,
        Category::DestinationRules,
        Category::Rules,
    ];

    /// Name used in requests (e.g. "virtualservices")
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RouteRules => "routerules",
            Category::DestinationPolicies => "destinationpolicies",
            Category::VirtualServices => "virtualservices",
            Category::DestinationRules => "destinationrules",
            Category::Rules => "rules",
        }
    }

    /// Registered kind fetched for this category
    pub fn kind(&self) -> &'static str {
        match self {
            Category::RouteRules => "RouteRule",
            Category::DestinationPolicies => "DestinationPolicy",
            Category::VirtualServices => "VirtualService",
            Category::DestinationRules => "DestinationRule",
            Category::Rules => "rule",
        }
    }

    /// Whether objects of this category carry traffic routes that can be switched
    pub fn is_routable(&self) -> bool {
        matches!(self, Category::RouteRules | Category::VirtualServices)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| MeshError::unsupported(s))
    }
}

/// Which categories to fetch, in which namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigCriteria {
    pub namespace: String,
    pub include_route_rules: bool,
    pub include_destination_policies: bool,
    pub include_virtual_services: bool,
    pub include_destination_rules: bool,
    pub include_rules: bool,
}

impl ConfigCriteria {
    /// Criteria including every category
    pub fn all(namespace: impl Into<String>) -> Self {
        Self::with_default(namespace.into(), true)
    }

    fn with_default(namespace: String, include: bool) -> Self {
        Self {
            namespace,
            include_route_rules: include,
            include_destination_policies: include,
            include_virtual_services: include,
            include_destination_rules: include,
            include_rules: include,
        }
    }

    /// Criteria for an explicit set of categories. An empty set means all.
    pub fn with_categories(
        namespace: impl Into<String>,
        categories: impl IntoIterator<Item = Category>,
    ) -> Self {
        let mut criteria = Self::with_default(namespace.into(), false);
        let mut any = false;
        for category in categories {
            criteria.set(category, true);
            any = true;
        }
        if !any {
            return Self::all(criteria.namespace);
        }
        criteria
    }

    /// Parse a comma-separated category list such as "routerules,rules".
    ///
    /// Matching is case-insensitive and unknown names are ignored. An empty
    /// string selects every category.
    pub fn parse(namespace: impl Into<String>, objects: &str) -> Self {
        let namespace = namespace.into();
        if objects.trim().is_empty() {
            return Self::all(namespace);
        }
        let mut criteria = Self::with_default(namespace, false);
        for part in objects.split(',') {
            if let Ok(category) = part.parse::<Category>() {
                criteria.set(category, true);
            }
        }
        criteria
    }

    pub fn includes(&self, category: Category) -> bool {
        match category {
            Category::RouteRules => self.include_route_rules,
            Category::DestinationPolicies => self.include_destination_policies,
            Category::VirtualServices => self.include_virtual_services,
            Category::DestinationRules => self.include_destination_rules,
            Category::Rules => self.include_rules,
        }
    }

    pub fn set(&mut self, category: Category, include: bool) {
        let flag = match category {
            Category::RouteRules => &mut self.include_route_rules,
            Category::DestinationPolicies => &mut self.include_destination_policies,
            Category::VirtualServices => &mut self.include_virtual_services,
            Category::DestinationRules => &mut self.include_destination_rules,
            Category::Rules => &mut self.include_rules,
        };
        *flag = include;
    }

    /// Included categories in canonical order
    pub fn included(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.includes(*c))
            .collect()
    }
}
