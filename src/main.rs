// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use anyhow::{Result, anyhow};
use clap::Parser;
use std::sync::Mutex;
use tracing::debug;
use tracing_subscriber::prelude::*;

use meshlens::cli::{Args, Command};
use meshlens::config::{self, Config};
use meshlens::kubernetes::registry::mesh_registry;
use meshlens::kubernetes::{IstioClient, KubeWorkloads, RequestLimiter, build_client};
use meshlens::mesh::{ConfigAggregator, ConfigCriteria, RouteSwitch};
use meshlens::output::render;
use meshlens::topology::TopologyService;

/// Initialize logging with file output and optional stderr
fn init_logging(verbose: bool) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};
    use tracing_subscriber::fmt::format::FmtSpan;

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Could not create log directory: {}", e);
        return;
    }

    // Rotate daily or at 10MB, keep 5 files
    let log_path = log_dir.join("meshlens.log");
    let condition = RollingConditionBase::new()
        .daily()
        .max_size(10 * 1024 * 1024);

    let file_appender = match RollingFileAppenderBase::new(log_path, condition, 5) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            return;
        }
    };

    let filter = if verbose {
        "meshlens=debug"
    } else {
        "meshlens=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file_appender))
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    if verbose {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(FmtSpan::NONE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let args = Args::parse();
    init_logging(args.verbose);

    // Command line flags override the config file
    let mut config = Config::load()?;
    if let Some(context) = &args.context {
        config.context = Some(context.clone());
    }
    if args.in_cluster {
        config.in_cluster = true;
    }
    debug!(config = ?config, "Effective configuration");

    let client = build_client(&config).await?;
    let limiter = RequestLimiter::new(config.rate_limit());

    let output = match &args.command {
        Command::List { namespace, objects } => {
            let aggregator = connect_aggregator(client, limiter).await?;
            let list = aggregator
                .get_config(&ConfigCriteria::parse(namespace.as_str(), objects))
                .await?;
            render(&list, &args.output, args.no_headers)?
        }
        Command::Get {
            namespace,
            category,
            name,
        } => {
            let aggregator = connect_aggregator(client, limiter).await?;
            let object = aggregator
                .get_config_details(namespace, category, name)
                .await?;
            render(&object, &args.output, args.no_headers)?
        }
        Command::Switch {
            namespace,
            name,
            version,
            objects,
        } => {
            let aggregator = connect_aggregator(client, limiter).await?;
            let criteria = ConfigCriteria::parse(namespace.as_str(), objects);
            let written = aggregator
                .switch_route(&criteria, &RouteSwitch::new(name, version))
                .await?;
            render(&written, &args.output, args.no_headers)?
        }
        Command::Correlate { namespace, service } => {
            let topology = TopologyService::new(KubeWorkloads::new(client, limiter));
            let deployments = topology.service_deployments(namespace, service).await?;
            render(&deployments, &args.output, args.no_headers)?
        }
        Command::Pods {
            namespace,
            service,
            version,
        } => {
            let topology = TopologyService::new(KubeWorkloads::new(client, limiter));
            let pods = topology
                .service_pods(namespace, service, version.as_deref())
                .await?;
            render(&pods, &args.output, args.no_headers)?
        }
        Command::Namespaces => {
            let topology = TopologyService::new(KubeWorkloads::new(client, limiter));
            let namespaces = topology.namespaces().await?;
            render(&namespaces, &args.output, args.no_headers)?
        }
    };

    println!("{}", output);
    Ok(())
}

async fn connect_aggregator(
    client: kube::Client,
    limiter: RequestLimiter,
) -> Result<ConfigAggregator<IstioClient>> {
    let registry = mesh_registry()?;
    let istio = IstioClient::connect(client, registry, limiter).await?;
    Ok(ConfigAggregator::new(istio))
}
