//! Reconciliation metrics, plus gauges for the discovery concurrency
//! controller (§4.2 / §5) since it is a cluster-scoped invariant worth
//! observing directly.

use crate::error::Error;

use kube::ResourceExt;
use opentelemetry::trace::TraceId;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{
    counter::Counter, exemplar::HistogramWithExemplars, family::Family, gauge::Gauge,
};
use prometheus_client::registry::{Registry, Unit};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconcile: ReconcileMetrics,
    pub discovery: DiscoveryMetrics,
}

impl Metrics {
    /// Registers reconcile and discovery metrics into a shared registry —
    /// the same one the binary uses for the http client's transport
    /// metrics, so `/metrics` exposes both under one set of families.
    pub fn register(registry: &mut Registry) -> Self {
        Self {
            reconcile: ReconcileMetrics::default().register(registry),
            discovery: DiscoveryMetrics::default().register(registry),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::register(&mut Registry::with_prefix("aim_template_reconcile"))
    }
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug, Default)]
pub struct TraceLabel {
    pub id: String,
}
impl TryFrom<&TraceId> for TraceLabel {
    type Error = Error;

    fn try_from(id: &TraceId) -> Result<TraceLabel, Self::Error> {
        if std::matches!(id, &TraceId::INVALID) {
            Err(Error::Invariant("invalid trace id".to_owned()))
        } else {
            let trace_id = id.to_string();
            Ok(Self { id: trace_id })
        }
    }
}

#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Family<(), Counter>,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: HistogramWithExemplars<TraceLabel>,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Family::<(), Counter>::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            duration: HistogramWithExemplars::new([0.1, 0.5, 1., 5., 10.].into_iter()),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn set_failure<K: ResourceExt>(&self, obj: &Arc<K>, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: obj.name_any(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self, trace_id: &TraceId) -> ReconcileMeasurer {
        self.runs.get_or_create(&()).inc();
        ReconcileMeasurer {
            start: Instant::now(),
            labels: trace_id.try_into().ok(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    labels: Option<TraceLabel>,
    metric: HistogramWithExemplars<TraceLabel>,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        let labels = self.labels.take();
        self.metric.observe(duration, labels);
    }
}

/// Metrics for the §4.2 discovery concurrency controller: a live view of
/// semaphore pressure and backoff behavior across all templates.
#[derive(Clone, Default)]
pub struct DiscoveryMetrics {
    pub slots_held: Gauge<i64, AtomicI64>,
    pub slots_max: Gauge<i64, AtomicI64>,
    pub jobs_created: Counter,
    pub jobs_orphaned: Counter,
    pub backoff_waits: Counter,
}

impl DiscoveryMetrics {
    pub fn register(self, r: &mut Registry) -> Self {
        r.register(
            "discovery_slots_held",
            "discovery semaphore slots currently held",
            self.slots_held.clone(),
        );
        r.register(
            "discovery_slots_max",
            "discovery semaphore capacity",
            self.slots_max.clone(),
        );
        r.register(
            "discovery_jobs_created",
            "discovery jobs created",
            self.jobs_created.clone(),
        );
        r.register(
            "discovery_jobs_orphaned",
            "discovery semaphore slots released as orphaned",
            self.jobs_orphaned.clone(),
        );
        r.register(
            "discovery_backoff_waits",
            "reconciles that deferred a discovery job due to backoff",
            self.backoff_waits.clone(),
        );
        self
    }
}
