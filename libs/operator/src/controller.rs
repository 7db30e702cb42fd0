//! Shared controller state: the `Context` injected into every reconcile
//! and `error_policy` call, and the `State` the web server reads for
//! `/health` and `/metrics`. Shared across both the namespace-scoped and
//! cluster-scoped template controllers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::client::Client;
use kube::runtime::events::Reporter;
use prometheus_client::registry::Registry;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::metrics::Metrics;

/// Operator-wide knobs that don't belong on any single template's spec
/// (§5's concurrency model, ambient CLI config).
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub max_discovery_concurrency: usize,
    pub requeue_after_secs: u64,
    /// Namespace discovery jobs and cache resources for cluster-scoped
    /// templates are created in, since `AIMClusterServiceTemplate` has no
    /// namespace of its own to inherit.
    pub discovery_job_namespace: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            max_discovery_concurrency: 4,
            requeue_after_secs: 30,
            discovery_job_namespace: "aim-system".to_owned(),
        }
    }
}

/// Context for our reconcilers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Arc<Metrics>,
    /// Operator-wide config
    pub config: OperatorConfig,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    #[serde(deserialize_with = "from_ts")]
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "aim-template-controller".into(),
        }
    }
}

fn from_ts<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    Ok(DateTime::<Utc>::deserialize(deserializer).unwrap_or_else(|_| Utc::now()))
}

/// State shared between both controllers and the web server
#[derive(Clone)]
pub struct State {
    /// Diagnostics populated by the reconcilers
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics
    metrics: Arc<Metrics>,
    /// Registry metrics (reconcile, discovery, and the http client's
    /// transport metrics registered by the caller before this is built)
    /// are collected into, so `/metrics` exposes all of them together.
    registry: Arc<Registry>,
    /// Operator-wide config
    config: OperatorConfig,
}

impl State {
    /// Builds state around a registry the caller has already wired the
    /// http client's transport metrics into (§5 ambient metrics stack).
    pub fn new(config: OperatorConfig, mut registry: Registry) -> Self {
        let metrics = Arc::new(Metrics::register(&mut registry));
        Self {
            diagnostics: Arc::default(),
            metrics,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Metrics getter
    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry).unwrap();
        buffer
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            config: self.config.clone(),
        })
    }
}
