//! `AIMModel` CRD — the "model descriptor" entity of §3: an upstream
//! dependency the template pipeline fetches but never owns or mutates.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::ModelSourceSpec;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMModel",
    plural = "aimmodels",
    shortname = "aimm",
    namespaced,
    derive = "PartialEq"
)]
#[kube(printcolumn = r#"{"jsonPath": ".spec.image", "name": "IMAGE", "type": "string"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AIMModelSpec {
    /// Container image this model descriptor resolves to. Must be
    /// non-empty for a dependent template to progress past *Pending*.
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_sources: Option<Vec<ModelSourceSpec>>,
}

impl AIMModelSpec {
    pub fn is_usable(&self) -> bool {
        !self.image.trim().is_empty()
    }
}
