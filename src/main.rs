// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::{Parser, Subcommand};
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cilium_reconciler::catalog::{select, ReleaseCatalog};
use cilium_reconciler::config::{Config, DeploymentConfig};
use cilium_reconciler::kubernetes::{ConfigMapStateStore, KubeClusterClient};
use cilium_reconciler::reconcilers::DeploymentReconciler;
use cilium_reconciler::resources::{Arch, ResourceFetcher};
use cilium_reconciler::sync::{CancelFlag, ClusterApplier, UpgradeReconciler};

#[derive(Parser)]
#[command(name = "cilium-reconciler")]
#[command(about = "Reconciles Cilium and Hubble release bundles into a cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bundled releases, newest first
    ListVersions,
    /// List the objects of a release matching the filters
    ListResources {
        /// Controller to select (cilium or hubble); empty selects all
        #[arg(default_value = "")]
        controller: String,
        /// Space-separated resource kinds; empty selects all
        #[arg(default_value = "")]
        resources: String,
        /// Release to inspect, newest when unset
        #[arg(long)]
        release: Option<String>,
    },
    /// Reconcile a single scope once and exit
    Reconcile {
        #[arg(long, default_value = "default")]
        scope: String,
        #[command(flatten)]
        deployment: DeploymentConfig,
    },
    /// Watch deployment ConfigMaps and reconcile their scopes
    Run,
    /// Download and verify the CLI archives of a release
    FetchResources {
        #[arg(long)]
        release: Option<String>,
        #[arg(long, value_enum, default_value_t = Arch::Amd64)]
        arch: Arch,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cilium_reconciler=info"));
    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cancel_on_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight reconciliation");
            cancel.cancel();
        }
    });
}

fn upgrader(client: Client, config: &Config) -> Result<UpgradeReconciler<KubeClusterClient, ConfigMapStateStore>> {
    let catalog = Arc::new(ReleaseCatalog::embedded()?);
    let cluster = Arc::new(KubeClusterClient::new(client.clone(), config.api_timeout));
    let applier = ClusterApplier::new(cluster, config.apply_concurrency);
    let store = Arc::new(ConfigMapStateStore::new(client, &config.state_namespace, config.api_timeout));
    Ok(UpgradeReconciler::new(catalog, applier, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::ListVersions => {
            let catalog = ReleaseCatalog::embedded()?;
            for release in catalog.list_releases() {
                println!("{}", release.version());
            }
        }
        Commands::ListResources {
            controller,
            resources,
            release,
        } => {
            let catalog = ReleaseCatalog::embedded()?;
            let release = catalog.resolve(release.as_deref())?;
            for doc in select(release, &controller, &resources)? {
                println!("{}", doc.object_ref());
            }
        }
        Commands::Reconcile { scope, deployment } => {
            let config = Config::from_env()?;
            let client = Client::try_default().await?;
            info!("Connected to Kubernetes cluster");

            let upgrader = upgrader(client, &config)?;
            let cancel = CancelFlag::new();
            cancel_on_ctrl_c(cancel.clone());

            let report = upgrader.reconcile(&scope, &deployment, &cancel).await?;
            match &report.from {
                Some(from) => info!("Scope {} moved from {} to {}", report.scope, from, report.to),
                None => info!("Scope {} installed at {}", report.scope, report.to),
            }
            info!(
                "{} object(s) changed, {} added, {} pruned",
                report.apply.mutations(),
                report.added,
                report.removed
            );
        }
        Commands::Run => {
            let config = Config::from_env()?;
            let client = Client::try_default().await?;
            info!(
                "Configuration loaded: state_namespace={}, config_namespace={}",
                config.state_namespace, config.config_namespace
            );

            let upgrader = Arc::new(upgrader(client.clone(), &config)?);
            let shutdown = CancelFlag::new();
            cancel_on_ctrl_c(shutdown.clone());

            DeploymentReconciler::new(client, config, upgrader, shutdown).run().await?;
            warn!("Deployment reconciler stopped");
        }
        Commands::FetchResources { release, arch, out } => {
            let config = Config::from_env()?;
            let catalog = ReleaseCatalog::embedded()?;
            let release = catalog.resolve(release.as_deref())?;

            tokio::fs::create_dir_all(&out).await?;
            let fetcher = ResourceFetcher::new(config.release_host, config.api_timeout)?;
            for path in fetcher.fetch_release(release, arch, &out).await? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}
