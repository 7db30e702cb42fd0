//! Discovery Concurrency Controller (§4.2): a cluster-wide bounded
//! semaphore over discovery-job creation, with a process-wide
//! "job-creation lock" serializing only the time-of-check/time-of-use
//! decision, plus the per-template backoff state machine.
//!
//! Single process-wide `OnceLock` state, consistent with §9's decision to
//! assume a single active leader rather than a lease-based distributed
//! lock (no replicated state to coordinate since only one process ever
//! reconciles at a time).

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

use crate::crd::common::DiscoveryBackoffStatus;
use crate::discovery::job::{
    DISCOVERY_COMPONENT, LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_SCOPE, LABEL_TEMPLATE,
    MANAGED_BY, SCOPE_CLUSTER,
};
use crate::error::{Error, Result};
use crate::metrics::DiscoveryMetrics;

struct SemaphoreState {
    max: usize,
    held: HashSet<String>,
}

/// Process-wide job-creation lock (§5 shared-resources table): held only
/// around the "is another holder? if not, acquire" decision.
static SEMAPHORE: OnceLock<Mutex<SemaphoreState>> = OnceLock::new();

fn semaphore(max: usize) -> &'static Mutex<SemaphoreState> {
    SEMAPHORE.get_or_init(|| {
        Mutex::new(SemaphoreState {
            max,
            held: HashSet::new(),
        })
    })
}

/// Non-blocking acquire. Returns `true` if the caller may create a job for
/// `key`: either a slot was just taken, or the caller already held one
/// (idempotent, per §8's `acquire(k); acquire(k)` law).
pub fn try_acquire(max: usize, key: &str, metrics: &DiscoveryMetrics) -> bool {
    let sem = semaphore(max);
    let mut state = sem.lock().unwrap_or_else(|e| e.into_inner());
    if state.held.contains(key) {
        return true;
    }
    if state.held.len() >= state.max {
        return false;
    }
    state.held.insert(key.to_owned());
    metrics.slots_held.set(state.held.len() as i64);
    metrics.slots_max.set(state.max as i64);
    metrics.jobs_created.inc();
    true
}

/// Releases the slot for `key`. Returns `true` iff a slot was actually
/// held (safe on double-release, per §8's `release(k); release(k)` law).
pub fn release(key: &str, metrics: &DiscoveryMetrics) -> bool {
    let sem = semaphore(1);
    let mut state = sem.lock().unwrap_or_else(|e| e.into_inner());
    let released = state.held.remove(key);
    if released {
        metrics.slots_held.set(state.held.len() as i64);
    }
    released
}

pub fn is_held(key: &str) -> bool {
    let sem = semaphore(1);
    let state = sem.lock().unwrap_or_else(|e| e.into_inner());
    state.held.contains(key)
}

/// Post-crash recovery: releases a held slot when neither a job exists
/// nor the template is Ready — the orphan-detection criteria of §4.2.
pub fn release_orphaned(
    key: &str,
    job_exists: bool,
    template_ready: bool,
    metrics: &DiscoveryMetrics,
) -> bool {
    if is_held(key) && !job_exists && !template_ready {
        let released = release(key, metrics);
        if released {
            metrics.jobs_orphaned.inc();
        }
        released
    } else {
        false
    }
}

/// Called once at process startup: seeds the held-slot set from
/// currently-active discovery jobs observed in the cluster so the
/// in-memory semaphore reflects reality across restarts.
pub fn initialize_from_cluster(max: usize, active_job_keys: impl IntoIterator<Item = String>) {
    let sem = semaphore(max);
    let mut state = sem.lock().unwrap_or_else(|e| e.into_inner());
    for key in active_job_keys {
        if state.held.len() >= state.max {
            break;
        }
        state.held.insert(key);
    }
}

/// Lists every still-active discovery `Job` across the cluster and seeds
/// the semaphore from them. Meant to be called once at process startup,
/// before either controller starts reconciling, so an operator restart
/// never lets total concurrent jobs silently exceed `max` (§4.2's
/// startup-recovery contract, the §8 crash-recovery scenario).
pub async fn seed_from_cluster(client: &Client, max: usize) -> Result<()> {
    let jobs: Api<Job> = Api::all(client.clone());
    let selector = format!("{LABEL_COMPONENT}={DISCOVERY_COMPONENT},{LABEL_MANAGED_BY}={MANAGED_BY}");
    let list = jobs
        .list(&ListParams::default().labels(&selector))
        .await
        .map_err(Error::KubeError)?;

    let active_keys = list
        .items
        .iter()
        .filter(|job| is_active(job))
        .map(|job| {
            let labels = job.labels();
            let template_name = labels.get(LABEL_TEMPLATE).cloned().unwrap_or_default();
            let cluster_scoped = labels.get(LABEL_SCOPE).map(String::as_str) == Some(SCOPE_CLUSTER);
            if cluster_scoped {
                format!("cluster:{template_name}")
            } else {
                format!("{}/{}", job.namespace().unwrap_or_default(), template_name)
            }
        })
        .collect::<Vec<_>>();

    initialize_from_cluster(max, active_keys);
    Ok(())
}

fn is_active(job: &Job) -> bool {
    match &job.status {
        None => true,
        Some(status) => status.succeeded.unwrap_or(0) == 0 && status.failed.unwrap_or(0) == 0,
    }
}

/// Exponential backoff with a ceiling, keyed by attempt count.
pub fn backoff_duration(attempts: u32) -> Duration {
    const BASE_SECS: u64 = 15;
    const CEILING_SECS: u64 = 30 * 60;
    let exp = attempts.min(10);
    let secs = BASE_SECS.saturating_mul(1u64 << exp).min(CEILING_SECS);
    Duration::from_secs(secs)
}

/// Decides whether the planner may create a new discovery job given the
/// template's stored backoff state and current spec fingerprint. A
/// fingerprint change always resets `attempts` to zero (§4.2, §8).
pub fn next_backoff_state(
    current: Option<&DiscoveryBackoffStatus>,
    spec_fingerprint: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> BackoffDecision {
    let Some(current) = current else {
        return BackoffDecision {
            may_attempt: true,
            reset_attempts: false,
        };
    };
    if current.spec_hash.as_deref() != Some(spec_fingerprint) {
        return BackoffDecision {
            may_attempt: true,
            reset_attempts: true,
        };
    }
    let Some(last_attempt) = current
        .last_attempt_time
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
    else {
        return BackoffDecision {
            may_attempt: true,
            reset_attempts: false,
        };
    };
    let ready_at = last_attempt.to_utc() + backoff_duration(current.attempts);
    BackoffDecision {
        may_attempt: now >= ready_at,
        reset_attempts: false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffDecision {
    pub may_attempt: bool,
    pub reset_attempts: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    fn metrics() -> DiscoveryMetrics {
        DiscoveryMetrics::default()
    }

    #[test]
    fn acquire_is_idempotent_for_the_same_key() {
        // each test uses a unique key since the semaphore is process-wide
        let m = metrics();
        assert!(try_acquire(2, "idempotent-test/a", &m));
        assert!(try_acquire(2, "idempotent-test/a", &m));
        assert!(release("idempotent-test/a", &m));
    }

    #[test]
    fn release_twice_only_succeeds_once() {
        let m = metrics();
        assert!(try_acquire(2, "double-release-test/a", &m));
        assert!(release("double-release-test/a", &m));
        assert!(!release("double-release-test/a", &m));
    }

    #[test]
    fn backoff_duration_is_monotonic_with_a_ceiling() {
        assert!(backoff_duration(1) < backoff_duration(2));
        assert!(backoff_duration(20) <= Duration::from_secs(30 * 60));
    }

    #[test]
    fn fingerprint_change_resets_attempts() {
        let status = DiscoveryBackoffStatus {
            attempts: 5,
            last_attempt_time: Some(chrono::Utc::now().to_rfc3339()),
            last_failure_reason: Some("boom".to_owned()),
            spec_hash: Some("old-hash".to_owned()),
        };
        let decision = next_backoff_state(Some(&status), "new-hash", chrono::Utc::now());
        assert!(decision.may_attempt);
        assert!(decision.reset_attempts);
    }
}
