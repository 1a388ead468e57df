mod json;
mod table;
mod yaml;

pub use json::JsonFormatter;
pub use table::TableFormatter;
pub use yaml::YamlFormatter;

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::cli::OutputFormat;
use crate::mesh::{ConfigObject, IstioConfigList};
use crate::topology::{DeploymentSummary, PodSummary};

/// Column/row view of a result, used for table output
#[derive(Debug, Clone, Default)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableData {
    fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Results that can be shown as a table
pub trait Tabular {
    fn to_table(&self) -> TableData;
}

/// Render `value` in the requested format. Table output goes through
/// [`Tabular`]; json and yaml serialize the value itself.
pub fn render<T: Serialize + Tabular>(
    value: &T,
    format: &OutputFormat,
    no_headers: bool,
) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(TableFormatter::format(&value.to_table(), no_headers)),
        OutputFormat::Json => JsonFormatter::format(value),
        OutputFormat::Yaml => YamlFormatter::format(value),
    }
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn object_row(object: &ConfigObject) -> Vec<String> {
    vec![
        object.category().to_string(),
        object.namespace().unwrap_or_default().to_string(),
        object.name().to_string(),
        object.resource_version().unwrap_or_default().to_string(),
        object.spec_value().to_string(),
    ]
}

const OBJECT_COLUMNS: &[&str] = &["category", "namespace", "name", "resource_version", "spec"];

impl Tabular for ConfigObject {
    fn to_table(&self) -> TableData {
        let mut table = TableData::new(OBJECT_COLUMNS);
        table.rows.push(object_row(self));
        table
    }
}

impl Tabular for IstioConfigList {
    fn to_table(&self) -> TableData {
        let mut table = TableData::new(OBJECT_COLUMNS);
        table.rows = self.objects().iter().map(object_row).collect();
        table
    }
}

impl Tabular for Vec<DeploymentSummary> {
    fn to_table(&self) -> TableData {
        let mut table = TableData::new(&["name", "namespace", "labels", "selector"]);
        for d in self {
            let selector = d
                .selector
                .as_ref()
                .and_then(|s| serde_json::to_string(s).ok())
                .unwrap_or_default();
            table.rows.push(vec![
                d.name.clone(),
                d.namespace.clone(),
                format_labels(&d.labels),
                selector,
            ]);
        }
        table
    }
}

impl Tabular for Vec<PodSummary> {
    fn to_table(&self) -> TableData {
        let mut table = TableData::new(&["name", "namespace", "labels"]);
        table.rows = self
            .iter()
            .map(|p| vec![p.name.clone(), p.namespace.clone(), format_labels(&p.labels)])
            .collect();
        table
    }
}

impl Tabular for Vec<String> {
    fn to_table(&self) -> TableData {
        let mut table = TableData::new(&["name"]);
        table.rows = self.iter().map(|n| vec![n.clone()]).collect();
        table
    }
}
