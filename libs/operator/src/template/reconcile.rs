//! Shared reconcile logic for both template controllers (§4.1, §4.7,
//! generalized over [`TemplateLike`] so the namespace-scoped and
//! cluster-scoped variants run through one pipeline).

use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{field, info, instrument, warn, Span};

use crate::config_merge;
use crate::controller::Context;
use crate::crd::common::{
    ChildRef, Condition, ConditionStatus, DiscoveryBackoffStatus, ResolvedHardware, TemplateLike,
    TemplatePhase,
};
use crate::crd::{AIMCache, AIMCacheSpec, AIMModel};
use crate::discovery::job::owner_reference;
use crate::discovery::{concurrency, hardware, job as job_builder, parser};
use crate::error::{Error, Result};
use crate::status::{self, ComponentHealth};
use crate::telemetry;

#[instrument(skip(obj, ctx), fields(trace_id))]
pub async fn reconcile<K: TemplateLike>(obj: Arc<K>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);
    ctx.diagnostics.write().await.last_event = Utc::now();

    let namespace = obj
        .namespace()
        .unwrap_or_else(|| ctx.config.discovery_job_namespace.clone());
    let name = obj.name_any();
    info!("reconciling template \"{name}\" in {namespace}");

    let spec = obj.template_spec();
    let client = ctx.client.clone();

    // --- Fetch ---------------------------------------------------------
    let model_api: Api<AIMModel> = Api::namespaced(client.clone(), &namespace);
    let model: crate::pipeline::FetchResult<AIMModel> = model_api
        .get_opt(&spec.model_name)
        .await
        .map_err(Error::KubeError)
        .into();

    let runtime_config: crate::pipeline::FetchResult<crate::crd::EffectiveRuntimeConfig> =
        config_merge::resolve(&client, &namespace, spec.runtime_config_name())
            .await
            .into();

    let cluster_scoped = obj.namespace().is_none();
    let inputs = build_job_inputs(&name, &namespace, cluster_scoped, spec, &model);
    let job_api: Api<Job> = Api::namespaced(client.clone(), &namespace);
    let discovery_job: crate::pipeline::FetchResult<Job> = match &inputs {
        Some(i) => job_api
            .get_opt(&i.job_name())
            .await
            .map_err(Error::KubeError)
            .into(),
        None => crate::pipeline::FetchResult::NotFound,
    };

    let inventory = if spec.requires_gpu() && !spec.has_inline_sources() {
        crate::inventory::probe(&client).await.map(Some)
    } else {
        Ok(None)
    };

    // --- Observe / component health -------------------------------------
    let mut components: Vec<ComponentHealth> = Vec::new();
    components.push(model.to_upstream_component_health("model"));
    components.push(runtime_config.to_upstream_component_health("runtimeConfig"));

    let hardware_availability = match &inventory {
        Ok(Some(inv)) => Some(hardware::matches(spec.hardware.as_ref().and_then(|h| h.gpu.as_ref()), inv)),
        Ok(None) => None,
        Err(e) => {
            components.push(ComponentHealth::from_fetch_error("inventory", e));
            None
        }
    };
    if let Some(hardware::Availability::Unavailable { reason }) = &hardware_availability {
        components.push(ComponentHealth::failed(
            "hardware",
            "UserMisconfiguration",
            reason.clone(),
        ));
    }

    let job_completed = discovery_job
        .ok()
        .map(job_succeeded)
        .unwrap_or(false);
    let job_failed = discovery_job.ok().map(job_failed_check).unwrap_or(false);
    // Not-found means "not yet created" while discovery is still needed and
    // pending, not "healthy" — `to_downstream_component_health` would mark
    // it Ready on the very first reconcile, letting the rollup go Ready
    // before the job has even run. Only a completed job, or a template
    // that bypasses discovery entirely, is Ready here.
    let discovery_health = if spec.has_inline_sources() {
        ComponentHealth::ready("discoveryJob")
    } else if job_completed {
        ComponentHealth::ready("discoveryJob")
    } else if job_failed {
        ComponentHealth::failed("discoveryJob", "DiscoveryJobFailed", "discovery job failed")
    } else {
        match &discovery_job {
            crate::pipeline::FetchResult::Found(_) => {
                ComponentHealth::progressing("discoveryJob", "DiscoveryRunning", "discovery job running")
            }
            crate::pipeline::FetchResult::NotFound => ComponentHealth::pending(
                "discoveryJob",
                "DiscoveryJobPending",
                "discovery job not yet created",
            ),
            crate::pipeline::FetchResult::Error(e) => ComponentHealth::from_fetch_error("discoveryJob", e),
        }
    };
    components.push(discovery_health);

    // --- Plan ------------------------------------------------------------
    let current_status = obj.template_status();
    let spec_fingerprint = inputs.as_ref().map(|i| i.fingerprint()).unwrap_or_default();
    let backoff_decision = concurrency::next_backoff_state(
        current_status.and_then(|s| s.discovery.as_ref()),
        &spec_fingerprint,
        Utc::now(),
    );

    let mut new_discovery_job: Option<Job> = None;
    let mut new_backoff = current_status.and_then(|s| s.discovery.clone());
    let mut parsed_profile = None;

    let wants_discovery = !spec.has_inline_sources()
        && matches!(model.ok(), Some(m) if m.spec.is_usable())
        && !matches!(hardware_availability, Some(hardware::Availability::Unavailable { .. }));

    if wants_discovery && discovery_job.is_not_found() && backoff_decision.may_attempt {
        if let Some(inputs) = &inputs {
            let key = inputs.semaphore_key();
            if concurrency::try_acquire(ctx.config.max_discovery_concurrency, &key, &ctx.metrics.discovery) {
                new_discovery_job = Some(job_builder::build(inputs, obj.as_ref()));
            } else {
                ctx.metrics.discovery.backoff_waits.inc();
            }
        }
    } else if backoff_decision.reset_attempts {
        new_backoff = Some(DiscoveryBackoffStatus {
            attempts: 0,
            last_attempt_time: None,
            last_failure_reason: None,
            spec_hash: Some(spec_fingerprint.clone()),
        });
    }

    if job_completed {
        if let Some(inputs) = &inputs {
            concurrency::release(&inputs.semaphore_key(), &ctx.metrics.discovery);
        }
        parsed_profile = fetch_and_parse_logs(&client, &namespace, discovery_job.ok()).await;
        if parsed_profile.is_some() {
            new_backoff = None;
        }
    } else if job_failed {
        if let Some(inputs) = &inputs {
            concurrency::release(&inputs.semaphore_key(), &ctx.metrics.discovery);
        }
        let attempts = current_status.and_then(|s| s.discovery.as_ref()).map_or(0, |b| b.attempts);
        let attempts = if backoff_decision.reset_attempts { 0 } else { attempts };
        new_backoff = Some(DiscoveryBackoffStatus {
            attempts: attempts + 1,
            last_attempt_time: Some(Utc::now().to_rfc3339()),
            last_failure_reason: Some("discovery job failed".to_owned()),
            spec_hash: Some(spec_fingerprint),
        });
    }

    // Inline sources bypass discovery outright (§3 invariant): stale
    // backoff state from a prior discovery attempt must not linger once
    // the template no longer runs one, even if the edit that added
    // `modelSources` didn't touch any discovery-fingerprint field.
    if spec.has_inline_sources() {
        new_backoff = None;
    }

    // Orphan recovery (§4.2): a slot held with no job and the template not
    // yet Ready indicates a crash between acquire and create.
    if let Some(inputs) = &inputs {
        let template_ready = current_status.map(|s| s.status == TemplatePhase::Ready).unwrap_or(false);
        concurrency::release_orphaned(
            &inputs.semaphore_key(),
            discovery_job.ok().is_some(),
            template_ready,
            &ctx.metrics.discovery,
        );
    }

    let wants_cache = spec.caching.as_ref().is_some_and(|c| c.enabled);
    let cache_api: Api<AIMCache> = Api::namespaced(client.clone(), &namespace);
    let existing_cache: crate::pipeline::FetchResult<AIMCache> =
        cache_api.get_opt(&name).await.map_err(Error::KubeError).into();
    components.push(existing_cache.to_downstream_component_health("cache"));
    let new_cache = if wants_cache && existing_cache.is_not_found() {
        Some(AIMCache::new(
            &name,
            AIMCacheSpec {
                template_name: name.clone(),
                storage_class: None,
                credentials_secret_ref: None,
            },
        ))
    } else {
        None
    };

    // --- Apply -------------------------------------------------------------
    if let Some(job) = new_discovery_job {
        match job_api.create(&PostParams::default(), &job).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
    if let Some(mut cache) = new_cache {
        cache.meta_mut().owner_references = Some(vec![owner_reference(obj.as_ref())]);
        match cache_api.create(&PostParams::default(), &cache).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {}
            Err(e) => return Err(Error::KubeError(e)),
        }
    }

    // --- Project status ------------------------------------------------
    let mut conditions = current_status
        .and_then(|s| s.conditions.clone())
        .unwrap_or_default();
    if let Some(profile) = &parsed_profile {
        status::upsert_condition(
            &mut conditions,
            "Discovered",
            ConditionStatus::True,
            "ProfileParsed",
            &format!("discovery profile parsed ({})", profile.profile.engine),
            false,
        );
    } else if job_failed {
        status::upsert_condition(
            &mut conditions,
            "Discovered",
            ConditionStatus::False,
            "DiscoveryFailed",
            "discovery job failed",
            false,
        );
    }

    let resolved_hardware = resolve_hardware(spec, &parsed_profile, current_status);
    let hardware_summary = resolved_hardware.as_ref().map(hardware::summarize);

    let overall = status::rollup(&components);

    let mut new_status = current_status.cloned().unwrap_or_default();
    new_status.status = overall;
    new_status.conditions = Some(conditions);
    if let Some(profile) = parsed_profile {
        new_status.profile = Some(profile.profile);
        new_status.model_sources = Some(profile.model_sources);
    }
    new_status.resolved_hardware = resolved_hardware;
    new_status.hardware_summary = hardware_summary;
    new_status.discovery = new_backoff;
    if let Some(inputs) = &inputs {
        new_status.discovery_job = Some(ChildRef {
            name: inputs.job_name(),
            namespace: Some(namespace.clone()),
        });
    }

    if current_status != Some(&new_status) {
        let patch = serde_json::json!({ "status": new_status });
        let api: Api<K> = match obj.namespace() {
            Some(ns) => Api::namespaced(client.clone(), &ns),
            None => Api::all(client.clone()),
        };
        if let Err(e) = api
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            warn!("status patch conflict, will retry: {e:?}");
            return Ok(Action::requeue(std::time::Duration::from_secs(5)));
        }
    }

    Ok(Action::requeue(std::time::Duration::from_secs(
        ctx.config.requeue_after_secs,
    )))
}

pub fn error_policy<K: TemplateLike>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {error:?}");
    ctx.metrics.reconcile.set_failure(&obj, error);
    Action::requeue(std::time::Duration::from_secs(5 * 60))
}

fn build_job_inputs(
    name: &str,
    namespace: &str,
    cluster_scoped: bool,
    spec: &crate::crd::common::TemplateSpec,
    model: &crate::pipeline::FetchResult<AIMModel>,
) -> Option<job_builder::DiscoveryJobInputs> {
    let model = model.ok()?;
    let gpu = spec.hardware.as_ref().and_then(|h| h.gpu.as_ref());
    Some(job_builder::DiscoveryJobInputs {
        template_name: name.to_owned(),
        namespace: namespace.to_owned(),
        cluster_scoped,
        model_id: spec.model_name.clone(),
        image: model.spec.image.clone(),
        pull_secrets: model.spec.image_pull_secrets.clone().unwrap_or_default(),
        service_account: model.spec.service_account_name.clone(),
        gpu_model: gpu.and_then(|g| g.models.first().cloned()),
        gpu_count: gpu.map(|g| g.requests),
        metric: spec.metric.clone(),
        precision: spec.precision.clone(),
    })
}

fn job_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .is_some_and(|n| n > 0)
}

fn job_failed_check(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.failed)
        .is_some_and(|n| n > 0)
}

async fn fetch_and_parse_logs(
    client: &kube::Client,
    namespace: &str,
    job: Option<&Job>,
) -> Option<parser::ParsedDiscovery> {
    let job = job?;
    if !job_succeeded(job) {
        return None;
    }
    let job_name = job.name_any();
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let list = pods
        .list(&ListParams::default().labels(&format!("job-name={job_name}")))
        .await
        .ok()?;
    let pod = list.items.into_iter().next()?;
    let logs = pods
        .logs(&pod.name_any(), &LogParams::default())
        .await
        .ok()?;
    parser::parse(logs.as_bytes()).ok()
}

fn resolve_hardware(
    spec: &crate::crd::common::TemplateSpec,
    parsed: &Option<parser::ParsedDiscovery>,
    current: Option<&crate::crd::common::TemplateStatus>,
) -> Option<ResolvedHardware> {
    let spec_gpu = spec.hardware.as_ref().and_then(|h| h.gpu.as_ref());
    if let Some(parsed) = parsed {
        return Some(ResolvedHardware {
            gpu_model: parsed.profile.gpu.clone(),
            gpu_count: parsed.profile.gpu_count,
            min_vram: spec_gpu.and_then(|g| g.min_vram.clone()),
            resource_name: spec_gpu.and_then(|g| g.resource_name.clone()),
        });
    }
    current.and_then(|s| s.resolved_hardware.clone())
}
