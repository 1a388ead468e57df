// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Label selectors.
//!
//! Unlike the API server, an empty selector here matches **nothing**: a
//! service or deployment without a selector must never be correlated with
//! every pod of the namespace.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector as K8sLabelSelector;
use regex::Regex;
use thiserror::Error;

/// Label name part: up to 63 alphanumerics, '-', '_' or '.', alphanumeric at both ends
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([-A-Za-z0-9_.]{0,61}[A-Za-z0-9])?$").expect("valid regex")
});

/// Label key prefix: a DNS-1123 subdomain
static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid regex")
});

const MAX_PREFIX_LEN: usize = 253;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid label key `{0}`")]
    InvalidKey(String),

    #[error("invalid value `{value}` for label `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("unknown selector operator `{operator}` for label `{key}`")]
    UnknownOperator { key: String, operator: String },

    #[error("operator `{operator}` for label `{key}` needs at least one value")]
    MissingValues { key: String, operator: String },

    #[error("operator `{operator}` for label `{key}` takes no values")]
    UnexpectedValues { key: String, operator: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals(String),
    In(Vec<String>),
    NotIn(Vec<String>),
    Exists,
    DoesNotExist,
}

/// One key constraint of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match &self.operator {
            Operator::Equals(expected) => value == Some(expected),
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::NotIn(values) => value.is_none_or(|v| !values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operator {
            Operator::Equals(v) => write!(f, "{}={}", self.key, v),
            Operator::In(vs) => write!(f, "{} in ({})", self.key, vs.join(",")),
            Operator::NotIn(vs) => write!(f, "{} notin ({})", self.key, vs.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Selector from plain key/value pairs (a service's `spec.selector`)
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            requirements: labels
                .iter()
                .map(|(k, v)| Requirement {
                    key: k.clone(),
                    operator: Operator::Equals(v.clone()),
                })
                .collect(),
        }
    }

    /// Compile a workload selector (`matchLabels` plus `matchExpressions`).
    ///
    /// An absent selector compiles to the empty selector, which matches nothing.
    pub fn from_k8s(selector: Option<&K8sLabelSelector>) -> Result<Self, SelectorError> {
        let Some(selector) = selector else {
            return Ok(Self::default());
        };

        let mut requirements = Vec::new();

        for (key, value) in selector.match_labels.iter().flatten() {
            validate_key(key)?;
            validate_value(key, value)?;
            requirements.push(Requirement {
                key: key.clone(),
                operator: Operator::Equals(value.clone()),
            });
        }

        for expr in selector.match_expressions.iter().flatten() {
            validate_key(&expr.key)?;
            let values = expr.values.clone().unwrap_or_default();
            for value in &values {
                validate_value(&expr.key, value)?;
            }

            let operator = match expr.operator.as_str() {
                "In" | "NotIn" if values.is_empty() => {
                    return Err(SelectorError::MissingValues {
                        key: expr.key.clone(),
                        operator: expr.operator.clone(),
                    });
                }
                "Exists" | "DoesNotExist" if !values.is_empty() => {
                    return Err(SelectorError::UnexpectedValues {
                        key: expr.key.clone(),
                        operator: expr.operator.clone(),
                    });
                }
                "In" => Operator::In(values),
                "NotIn" => Operator::NotIn(values),
                "Exists" => Operator::Exists,
                "DoesNotExist" => Operator::DoesNotExist,
                other => {
                    return Err(SelectorError::UnknownOperator {
                        key: expr.key.clone(),
                        operator: other.to_string(),
                    });
                }
            };
            requirements.push(Requirement {
                key: expr.key.clone(),
                operator,
            });
        }

        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// True if every requirement holds. The empty selector matches nothing.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        !self.is_empty() && self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

fn validate_key(key: &str) -> Result<(), SelectorError> {
    let invalid = || SelectorError::InvalidKey(key.to_string());
    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN || !PREFIX_RE.is_match(prefix) {
                return Err(invalid());
            }
            name
        }
        None => key,
    };
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(invalid())
    }
}

fn validate_value(key: &str, value: &str) -> Result<(), SelectorError> {
    if value.is_empty() || NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(SelectorError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn expr(key: &str, operator: &str, values: Option<&[&str]>) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: values.map(|vs| vs.iter().map(|v| v.to_string()).collect()),
        }
    }

    #[test]
    fn test_equality_selector() {
        let sel = LabelSelector::from_labels(&labels(&[("app", "reviews")]));
        assert!(sel.matches(&labels(&[("app", "reviews"), ("version", "v1")])));
        assert!(!sel.matches(&labels(&[("app", "ratings")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn test_empty_selector_matches_nothing() {
        let sel = LabelSelector::from_labels(&BTreeMap::new());
        assert!(sel.is_empty());
        assert!(!sel.matches(&labels(&[])));
        assert!(!sel.matches(&labels(&[("app", "reviews")])));

        let absent = LabelSelector::from_k8s(None).unwrap();
        assert!(!absent.matches(&labels(&[("app", "reviews")])));

        let blank = LabelSelector::from_k8s(Some(&K8sLabelSelector::default())).unwrap();
        assert!(!blank.matches(&labels(&[("app", "reviews")])));
    }

    #[test]
    fn test_match_expressions() {
        let sel = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: Some(labels(&[("app", "reviews")])),
            match_expressions: Some(vec![
                expr("version", "In", Some(&["v1", "v2"])),
                expr("canary", "DoesNotExist", None),
                expr("tier", "NotIn", Some(&["db"])),
            ]),
        }))
        .unwrap();

        assert!(sel.matches(&labels(&[("app", "reviews"), ("version", "v2")])));
        assert!(sel.matches(&labels(&[("app", "reviews"), ("version", "v1"), ("tier", "web")])));
        assert!(!sel.matches(&labels(&[("app", "reviews"), ("version", "v3")])));
        assert!(!sel.matches(&labels(&[("app", "reviews"), ("version", "v1"), ("canary", "true")])));
        assert!(!sel.matches(&labels(&[("app", "reviews"), ("version", "v1"), ("tier", "db")])));
    }

    #[test]
    fn test_exists_operator() {
        let sel = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("version", "Exists", None)]),
        }))
        .unwrap();
        assert!(sel.matches(&labels(&[("version", "anything")])));
        assert!(!sel.matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn test_unknown_operator_is_malformed() {
        let err = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("version", "Like", Some(&["v1"]))]),
        }))
        .unwrap_err();
        assert_eq!(
            err,
            SelectorError::UnknownOperator {
                key: "version".to_string(),
                operator: "Like".to_string()
            }
        );
    }

    #[test]
    fn test_in_without_values_is_malformed() {
        let err = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("version", "In", Some(&[]))]),
        }))
        .unwrap_err();
        assert!(matches!(err, SelectorError::MissingValues { .. }));
    }

    #[test]
    fn test_exists_with_values_is_malformed() {
        let err = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: None,
            match_expressions: Some(vec![expr("version", "Exists", Some(&["v1"]))]),
        }))
        .unwrap_err();
        assert!(matches!(err, SelectorError::UnexpectedValues { .. }));
    }

    #[test]
    fn test_invalid_keys_and_values() {
        assert!(validate_key("app").is_ok());
        assert!(validate_key("app.kubernetes.io/name").is_ok());
        assert!(validate_key("-app").is_err());
        assert!(validate_key("/app").is_err());
        assert!(validate_key("Bad_Prefix/app").is_err());
        assert!(validate_key(&"a".repeat(64)).is_err());

        assert!(validate_value("app", "").is_ok());
        assert!(validate_value("app", "reviews-v1").is_ok());
        assert!(validate_value("app", "has space").is_err());

        let err = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: Some(labels(&[("app", "bad value!")])),
            match_expressions: None,
        }))
        .unwrap_err();
        assert!(matches!(err, SelectorError::InvalidValue { .. }));
    }

    #[test]
    fn test_display() {
        let sel = LabelSelector::from_k8s(Some(&K8sLabelSelector {
            match_labels: Some(labels(&[("app", "reviews")])),
            match_expressions: Some(vec![expr("version", "In", Some(&["v1", "v2"]))]),
        }))
        .unwrap();
        assert_eq!(sel.to_string(), "app=reviews,version in (v1,v2)");
    }
}
