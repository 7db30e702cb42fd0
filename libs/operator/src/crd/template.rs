//! Namespace-scoped `AIMServiceTemplate` CRD (§3, §6).

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{TemplateLike, TemplateSpec, TemplateStatus};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMServiceTemplate",
    plural = "aimservicetemplates",
    shortname = "aimt",
    namespaced,
    status = "TemplateStatus",
    derive = "PartialEq"
)]
#[kube(printcolumn = r#"{"jsonPath": ".status.status", "name": "STATUS", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".spec.modelName", "name": "MODEL", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".status.hardwareSummary", "name": "HARDWARE", "type": "string"}"#)]
#[kube(printcolumn = r#"{"jsonPath": ".metadata.creationTimestamp", "name": "AGE", "type": "date"}"#)]
#[serde(rename_all = "camelCase")]
pub struct AIMServiceTemplateSpec {
    #[serde(flatten)]
    pub template: TemplateSpec,
}

impl TemplateLike for AIMServiceTemplate {
    fn template_spec(&self) -> &TemplateSpec {
        &self.spec.template
    }

    fn template_status(&self) -> Option<&TemplateStatus> {
        self.status.as_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn runtime_config_name_defaults_to_default() {
        let spec = AIMServiceTemplateSpec {
            template: TemplateSpec {
                model_name: "llama3".to_owned(),
                ..Default::default()
            },
        };
        assert_eq!(spec.template.runtime_config_name(), "default");
    }
}
