//! `AIMCache` CRD — the "template cache resource" entity of §3. The
//! planner creates and owns this resource when caching opts in; the
//! cache-controller logic that consumes it is explicitly out of scope
//! (Non-goals, §1).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMCache",
    plural = "aimcaches",
    shortname = "aimc",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct AIMCacheSpec {
    /// Name of the `AIMServiceTemplate`/`AIMClusterServiceTemplate` this
    /// cache resource warms storage for. Redundant with the owner
    /// reference, kept for readability when listing bare `AIMCache`
    /// objects.
    pub template_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<String>,
}
