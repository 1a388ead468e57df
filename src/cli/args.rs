// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "meshlens")]
#[command(author, version, about = "Inspect service-mesh configuration and service topology")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Kubeconfig context to use (overrides the config file)
    #[arg(short, long, value_name = "CONTEXT", global = true)]
    pub context: Option<String>,

    /// Use the in-cluster service account
    #[arg(long, global = true)]
    pub in_cluster: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Omit column headers in table output
    #[arg(long, global = true)]
    pub no_headers: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List mesh configuration of a namespace
    List {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Comma-separated categories (routerules, destinationpolicies,
        /// virtualservices, destinationrules, rules); all when empty
        #[arg(long, default_value = "")]
        objects: String,
    },

    /// Show a single configuration object
    Get {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Category, e.g. virtualservices
        category: String,

        name: String,
    },

    /// Send all traffic of a routing rule to one version
    Switch {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Routing rule name
        name: String,

        /// Target version
        version: String,

        /// Categories to search for the rule; all routable ones when empty
        #[arg(long, default_value = "")]
        objects: String,
    },

    /// Deployments backing a service
    Correlate {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        service: String,
    },

    /// Pods behind a service
    Pods {
        #[arg(short, long, default_value = "default")]
        namespace: String,

        service: String,

        /// Only pods with this `version` label
        #[arg(long)]
        version: Option<String>,
    },

    /// List namespaces
    Namespaces,
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}
