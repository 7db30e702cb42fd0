//! Cluster-scoped `AIMClusterServiceTemplate` CRD (§3, §6). Identical shape
//! to [`super::template::AIMServiceTemplate`]; the two exist as distinct
//! Kubernetes kinds because `kube::CustomResource` ties scope to the type,
//! but the reconciliation pipeline (§4.1) treats them generically through
//! [`super::common::TemplateSpec`] / [`super::common::TemplateStatus`].

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{TemplateLike, TemplateSpec, TemplateStatus};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMClusterServiceTemplate",
    plural = "aimclusterservicetemplates",
    shortname = "aimct",
    status = "TemplateStatus",
    derive = "PartialEq"
)]
#[kube(printcolumn = r#"{"jsonPath": ".status.status", "name": "STATUS", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".spec.modelName", "name": "MODEL", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".status.hardwareSummary", "name": "HARDWARE", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".metadata.creationTimestamp", "name": "AGE", "type": "date"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AIMClusterServiceTemplateSpec {
    #[serde(flatten)]
    pub template: TemplateSpec,
}

impl TemplateLike for AIMClusterServiceTemplate {
    fn template_spec(&self) -> &TemplateSpec {
        &self.spec.template
    }

    fn template_status(&self) -> Option<&TemplateStatus> {
        self.status.as_ref()
    }
}
