//! Discovery Job Builder (§4.3): produces the desired `Job` specification
//! for a discovery workload, deterministically named from exactly the
//! inputs that affect its behavior (§3 invariant).

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar as K8sEnvVar, PodSecurityContext, PodSpec, PodTemplateSpec,
    SeccompProfile, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use sha2::{Digest, Sha256};

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_TEMPLATE: &str = "aim.example.com/template";
pub const LABEL_SCOPE: &str = "aim.example.com/scope";

pub const DISCOVERY_COMPONENT: &str = "discovery";
pub const MANAGED_BY: &str = "aim-operator";
pub const SCOPE_CLUSTER: &str = "cluster";
pub const SCOPE_NAMESPACED: &str = "namespaced";

const MAX_NAME_LEN: usize = 63;
const BACKOFF_LIMIT: i32 = 2;
const TTL_SECONDS_AFTER_FINISHED: i32 = 60;

/// Exactly the inputs that change a discovery job's behavior (§4.3): two
/// invocations with identical values here always yield the same name;
/// any difference, even whitespace, yields a distinct one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiscoveryJobInputs {
    pub template_name: String,
    pub namespace: String,
    /// Whether this job belongs to a cluster-scoped `AIMClusterServiceTemplate`
    /// rather than a namespaced `AIMServiceTemplate` — changes the
    /// semaphore key so the two scopes never collide on name alone
    /// (§3's "Concurrency slot" entity).
    pub cluster_scoped: bool,
    pub model_id: String,
    pub image: String,
    pub pull_secrets: Vec<String>,
    pub service_account: Option<String>,
    pub gpu_model: Option<String>,
    pub gpu_count: Option<i32>,
    pub metric: Option<String>,
    pub precision: Option<String>,
}

impl DiscoveryJobInputs {
    /// The deterministic, name-affecting fingerprint (§3, §4.2, §4.3):
    /// used both for the job name and as the backoff spec fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.template_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.namespace.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.model_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.image.as_bytes());
        hasher.update(b"\0");
        for secret in &self.pull_secrets {
            hasher.update(secret.as_bytes());
            hasher.update(b",");
        }
        hasher.update(b"\0");
        hasher.update(self.service_account.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(self.gpu_model.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(
            self.gpu_count
                .map(|c| c.to_string())
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update(b"\0");
        hasher.update(self.metric.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\0");
        hasher.update(self.precision.as_deref().unwrap_or("").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deterministic job name, truncated to the cluster's 63-character
    /// name limit.
    pub fn job_name(&self) -> String {
        let hash = self.fingerprint();
        let prefix = "aim-discovery-";
        let available = MAX_NAME_LEN - prefix.len();
        format!("{prefix}{}", &hash[..available.min(hash.len())])
    }

    /// Semaphore key (§4.2, §3's "Concurrency slot" entity):
    /// `"NAMESPACE/NAME"` for a namespaced template, `"cluster:NAME"` for a
    /// cluster-scoped one — kept distinct so a namespaced template sharing
    /// a name with a cluster-scoped one never shares its slot.
    pub fn semaphore_key(&self) -> String {
        if self.cluster_scoped {
            format!("cluster:{}", self.template_name)
        } else {
            format!("{}/{}", self.namespace, self.template_name)
        }
    }
}

/// Builds the desired `Job` for an owning resource. `owner` supplies the
/// owner reference (controller=true, block-owner-deletion=true).
pub fn build<K>(inputs: &DiscoveryJobInputs, owner: &K) -> Job
where
    K: Resource<DynamicType = ()>,
{
    let name = inputs.job_name();
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_owned(), "aim-discovery".to_owned());
    labels.insert(LABEL_COMPONENT.to_owned(), DISCOVERY_COMPONENT.to_owned());
    labels.insert(LABEL_MANAGED_BY.to_owned(), MANAGED_BY.to_owned());
    labels.insert(LABEL_TEMPLATE.to_owned(), inputs.template_name.clone());
    labels.insert(
        LABEL_SCOPE.to_owned(),
        if inputs.cluster_scoped {
            SCOPE_CLUSTER.to_owned()
        } else {
            SCOPE_NAMESPACED.to_owned()
        },
    );

    let mut env = vec![K8sEnvVar {
        name: "AIM_DISCOVERY_LOG_SILENT".to_owned(),
        value: Some("1".to_owned()),
        ..Default::default()
    }];
    if let Some(metric) = &inputs.metric {
        env.push(K8sEnvVar {
            name: "AIM_DISCOVERY_METRIC".to_owned(),
            value: Some(metric.clone()),
            ..Default::default()
        });
    }
    if let Some(precision) = &inputs.precision {
        env.push(K8sEnvVar {
            name: "AIM_DISCOVERY_PRECISION".to_owned(),
            value: Some(precision.clone()),
            ..Default::default()
        });
    }
    if let Some(gpu_model) = &inputs.gpu_model {
        env.push(K8sEnvVar {
            name: "AIM_DISCOVERY_GPU_MODEL".to_owned(),
            value: Some(gpu_model.clone()),
            ..Default::default()
        });
    }
    if let Some(gpu_count) = inputs.gpu_count {
        env.push(K8sEnvVar {
            name: "AIM_DISCOVERY_GPU_COUNT".to_owned(),
            value: Some(gpu_count.to_string()),
            ..Default::default()
        });
    }

    let security_context = SecurityContext {
        run_as_non_root: Some(true),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_owned()]),
            add: None,
        }),
        seccomp_profile: Some(SeccompProfile {
            type_: "RuntimeDefault".to_owned(),
            localhost_profile: None,
        }),
        ..Default::default()
    };

    let pull_secrets = (!inputs.pull_secrets.is_empty()).then(|| {
        inputs
            .pull_secrets
            .iter()
            .map(|name| k8s_openapi::api::core::v1::LocalObjectReference {
                name: name.clone(),
            })
            .collect()
    });

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(inputs.namespace.clone()),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(owner)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(BACKOFF_LIMIT),
            ttl_seconds_after_finished: Some(TTL_SECONDS_AFTER_FINISHED),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_owned()),
                    service_account_name: inputs.service_account.clone(),
                    image_pull_secrets: pull_secrets,
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        ..Default::default()
                    }),
                    containers: vec![Container {
                        name: "discovery".to_owned(),
                        image: Some(inputs.image.clone()),
                        env: Some(env),
                        security_context: Some(security_context),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        status: None,
    }
}

pub(crate) fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn inputs() -> DiscoveryJobInputs {
        DiscoveryJobInputs {
            template_name: "llama-70b".to_owned(),
            namespace: "ns".to_owned(),
            cluster_scoped: false,
            model_id: "llama-70b".to_owned(),
            image: "registry/llama:v1".to_owned(),
            pull_secrets: vec![],
            service_account: None,
            gpu_model: Some("MI300X".to_owned()),
            gpu_count: Some(1),
            metric: Some("throughput".to_owned()),
            precision: Some("fp8".to_owned()),
        }
    }

    #[test]
    fn identical_inputs_produce_identical_names() {
        assert_eq!(inputs().job_name(), inputs().job_name());
    }

    #[test]
    fn whitespace_change_in_a_name_affecting_field_changes_the_name() {
        let mut other = inputs();
        other.model_id.push(' ');
        assert_ne!(inputs().job_name(), other.job_name());
    }

    #[test]
    fn job_name_respects_the_cluster_name_limit() {
        assert!(inputs().job_name().len() <= MAX_NAME_LEN);
    }

    #[test]
    fn semaphore_key_is_namespace_slash_name() {
        assert_eq!(inputs().semaphore_key(), "ns/llama-70b");
    }

    #[test]
    fn cluster_scoped_semaphore_key_is_distinct_from_namespaced() {
        let mut cluster = inputs();
        cluster.cluster_scoped = true;
        cluster.namespace = "aim-system".to_owned();
        assert_eq!(cluster.semaphore_key(), "cluster:llama-70b");
        assert_ne!(cluster.semaphore_key(), inputs().semaphore_key());
    }
}
