// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{ReconcilerError, Result as ReconcileResult};
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the applied-state ConfigMaps
    pub state_namespace: String,
    /// Namespace watched for deployment ConfigMaps in controller mode
    pub config_namespace: String,
    /// Upper bound on concurrent object applies within a phase
    pub apply_concurrency: usize,
    /// Timeout for a single cluster API call
    pub api_timeout: Duration,
    /// Base URL CLI archives are downloaded from
    pub release_host: url::Url,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let state_namespace = env::var("STATE_NAMESPACE").unwrap_or_else(|_| "kube-system".to_string());
        let config_namespace = env::var("CONFIG_NAMESPACE").unwrap_or_else(|_| "kube-system".to_string());

        let apply_concurrency: usize = env::var("APPLY_CONCURRENCY")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .context("APPLY_CONCURRENCY must be a positive integer")?;
        anyhow::ensure!(apply_concurrency > 0, "APPLY_CONCURRENCY must be at least 1");

        let api_timeout_secs: u64 = env::var("API_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("API_TIMEOUT_SECS must be a number of seconds")?;

        let release_host = env::var("RELEASE_HOST")
            .unwrap_or_else(|_| "https://github.com".to_string())
            .parse()
            .context("RELEASE_HOST must be a URL")?;

        Ok(Config {
            state_namespace,
            config_namespace,
            apply_concurrency,
            api_timeout: Duration::from_secs(api_timeout_secs),
            release_host,
        })
    }
}

/// Overlay encapsulation used between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TunnelProtocol {
    #[default]
    Vxlan,
    Geneve,
}

impl TunnelProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelProtocol::Vxlan => "vxlan",
            TunnelProtocol::Geneve => "geneve",
        }
    }
}

impl fmt::Display for TunnelProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TunnelProtocol {
    type Err = ReconcilerError;

    fn from_str(s: &str) -> ReconcileResult<Self> {
        match s {
            "vxlan" => Ok(TunnelProtocol::Vxlan),
            "geneve" => Ok(TunnelProtocol::Geneve),
            other => Err(ReconcilerError::Validation(format!(
                "{} is not an allowed Cilium tunnel encapsulation protocol",
                other
            ))),
        }
    }
}

/// Hubble metrics accepted by the agent
pub const HUBBLE_METRICS: &[&str] = &[
    "dns",
    "drop",
    "flow",
    "flows-to-world",
    "http",
    "icmp",
    "kafka",
    "port-distribution",
    "tcp",
];

/// Desired deployment of one scope: target release plus configuration toggles
#[derive(Debug, Clone, PartialEq, Args)]
pub struct DeploymentConfig {
    /// Release to deploy, newest bundled release when unset
    #[arg(long, env = "CILIUM_RELEASE")]
    pub release: Option<String>,

    /// Registry host replacing the one in every container image
    #[arg(long, env = "IMAGE_REGISTRY")]
    pub image_registry: Option<String>,

    #[arg(long, value_enum, default_value_t = TunnelProtocol::Vxlan)]
    pub tunnel_protocol: TunnelProtocol,

    #[arg(long)]
    pub tunnel_port: Option<u16>,

    #[arg(long)]
    pub enable_hubble: bool,

    /// Space-separated Hubble metrics to expose
    #[arg(long, value_delimiter = ' ')]
    pub hubble_metrics: Vec<String>,

    #[arg(long)]
    pub enable_metrics: bool,

    #[arg(long)]
    pub enable_session_affinity: bool,

    #[arg(long, default_value = "10.1.0.0/16")]
    pub cluster_pool_ipv4_cidr: String,

    #[arg(long, default_value_t = 24)]
    pub cluster_pool_ipv4_mask_size: u8,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            release: None,
            image_registry: None,
            tunnel_protocol: TunnelProtocol::default(),
            tunnel_port: None,
            enable_hubble: false,
            hubble_metrics: Vec::new(),
            enable_metrics: false,
            enable_session_affinity: false,
            cluster_pool_ipv4_cidr: "10.1.0.0/16".to_string(),
            cluster_pool_ipv4_mask_size: 24,
        }
    }
}

impl DeploymentConfig {
    /// Parse deployment options from ConfigMap data. Empty values count as unset.
    pub fn from_data(data: &BTreeMap<String, String>) -> ReconcileResult<Self> {
        let mut config = DeploymentConfig::default();

        for (key, value) in data {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "release" => config.release = Some(value.to_string()),
                "image-registry" => config.image_registry = Some(value.to_string()),
                "tunnel-protocol" => config.tunnel_protocol = value.parse()?,
                "tunnel-port" => config.tunnel_port = Some(parse_value(key, value)?),
                "enable-hubble" => config.enable_hubble = parse_value(key, value)?,
                "hubble-metrics" => {
                    config.hubble_metrics = value.split_whitespace().map(str::to_string).collect()
                }
                "enable-metrics" => config.enable_metrics = parse_value(key, value)?,
                "enable-session-affinity" => config.enable_session_affinity = parse_value(key, value)?,
                "cluster-pool-ipv4-cidr" => config.cluster_pool_ipv4_cidr = value.to_string(),
                "cluster-pool-ipv4-mask-size" => {
                    config.cluster_pool_ipv4_mask_size = parse_value(key, value)?
                }
                other => warn!("Ignoring unknown deployment option '{}'", other),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check option values and combinations
    pub fn validate(&self) -> ReconcileResult<()> {
        for metric in &self.hubble_metrics {
            if !HUBBLE_METRICS.contains(&metric.as_str()) {
                return Err(ReconcilerError::Validation(format!(
                    "{} is not an allowed Hubble metric",
                    metric
                )));
            }
        }
        if !self.hubble_metrics.is_empty() && !self.enable_hubble {
            return Err(ReconcilerError::Validation(
                "hubble-metrics requires enable-hubble".to_string(),
            ));
        }
        if self.tunnel_port == Some(0) {
            return Err(ReconcilerError::Validation("tunnel-port must be between 1 and 65535".to_string()));
        }
        if !(1..=32).contains(&self.cluster_pool_ipv4_mask_size) {
            return Err(ReconcilerError::Validation(format!(
                "cluster-pool-ipv4-mask-size {} must be between 1 and 32",
                self.cluster_pool_ipv4_mask_size
            )));
        }
        validate_ipv4_cidr(&self.cluster_pool_ipv4_cidr)?;
        if let Some(registry) = &self.image_registry {
            if registry.contains(char::is_whitespace) || registry.ends_with('/') {
                return Err(ReconcilerError::Validation(format!(
                    "invalid image registry '{}'",
                    registry
                )));
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> ReconcileResult<T> {
    value
        .parse()
        .map_err(|_| ReconcilerError::Validation(format!("invalid value '{}' for {}", value, key)))
}

fn validate_ipv4_cidr(cidr: &str) -> ReconcileResult<()> {
    let invalid = || ReconcilerError::Validation(format!("invalid IPv4 CIDR '{}'", cidr));
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok(())
}
