//! Shared spec/status types used by both the namespace-scoped
//! `AIMServiceTemplate` and the cluster-scoped `AIMClusterServiceTemplate`
//! (§3, §6). Keeping the shape identical between the two is what makes the
//! reconciliation pipeline (§4.1) generic over scope.

use std::collections::BTreeMap;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Name of the owning `AIMModel` this template deploys.
    pub model_name: String,

    /// Optional hardware constraints (§4.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareSpec>,

    /// Optimization metric hint: "latency" | "throughput".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,

    /// Precision hint: "fp8" | "fp16" | "bf16".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,

    /// Inline model sources. Mutually exclusive with discovery (§3
    /// invariant: exactly one of inline sources or discovery runs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_sources: Option<Vec<ModelSourceSpec>>,

    /// Opt-in persistent caching of resolved model weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<CachingSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Name of the runtime-config entity merged for this template (§4.7).
    /// Defaults to "default" when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config_name: Option<String>,
}

impl TemplateSpec {
    pub fn runtime_config_name(&self) -> &str {
        self.runtime_config_name.as_deref().unwrap_or("default")
    }

    pub fn has_inline_sources(&self) -> bool {
        self.model_sources
            .as_ref()
            .is_some_and(|sources| !sources.is_empty())
    }

    pub fn requires_gpu(&self) -> bool {
        match &self.hardware {
            None => false,
            Some(hw) => match &hw.gpu {
                None => false,
                Some(gpu) => gpu.requests > 0 || !gpu.models.is_empty(),
            },
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<CpuSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GpuSpec {
    /// Acceptable GPU model names, compared case-insensitively with
    /// whitespace trimmed and family aliases resolved (§4.5). Empty means
    /// "any model" as long as `requests > 0`.
    #[serde(default)]
    pub models: Vec<String>,

    /// Number of GPUs requested.
    #[serde(default)]
    pub requests: i32,

    /// Minimum per-GPU VRAM, e.g. "80Gi". Ignored when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vram: Option<String>,

    /// Allocatable resource name to request from the scheduler, e.g.
    /// "amd.com/gpu". Carried through to the resolved hardware even when
    /// discovery supplies a model/count (§4.6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSourceSpec {
    pub model_id: String,
    /// `hf://` or `s3://` URI.
    pub source_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<EnvVar>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStatus {
    #[serde(default)]
    pub status: TemplatePhase,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Condition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_hardware: Option<ResolvedHardware>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<DiscoveryProfileStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_sources: Option<Vec<ResolvedModelSource>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_job: Option<ChildRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryBackoffStatus>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TemplatePhase {
    #[default]
    Pending,
    Progressing,
    Ready,
    Degraded,
    Failed,
    NotAvailable,
}

impl std::fmt::Display for TemplatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// RFC3339 timestamp. Kept as `String` rather than
    /// `k8s_openapi::apimachinery::pkg::apis::meta::v1::Time`, which has no
    /// `JsonSchema` impl under the `v1_30` feature set this crate builds
    /// with — the same workaround used throughout the ecosystem for
    /// schema-derived status types.
    #[serde(deserialize_with = "time_or_now", default = "now_time")]
    pub last_transition_time: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

fn now_time() -> String {
    Utc::now().to_rfc3339()
}

fn time_or_now<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(now_time))
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedHardware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_vram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryProfileStatus {
    pub engine: String,
    pub gpu: Option<String>,
    pub gpu_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,
    #[serde(default)]
    pub engine_args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModelSource {
    pub model_id: String,
    pub source_uri: String,
    pub size_bytes: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChildRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryBackoffStatus {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
}

/// Lets the reconciliation pipeline (§4.1) treat the namespace-scoped and
/// cluster-scoped template kinds generically, since they share
/// [`TemplateSpec`]/[`TemplateStatus`] but are distinct `kube::Resource`
/// types.
pub trait TemplateLike:
    kube::Resource<DynamicType = ()>
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Clone
    + Send
    + Sync
    + std::fmt::Debug
    + 'static
{
    fn template_spec(&self) -> &TemplateSpec;
    fn template_status(&self) -> Option<&TemplateStatus>;
}
