//! `AIMRuntimeConfig` / `AIMClusterRuntimeConfig` CRDs and their merge
//! contract (§4.7). Both kinds share [`RuntimeConfigSpec`]; only scope
//! differs, mirroring the template/cluster-template split in
//! [`super::template`] / [`super::cluster_template`].

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMRuntimeConfig",
    plural = "aimruntimeconfigs",
    shortname = "aimrc",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfigSpec {
    #[serde(default)]
    pub engine_args: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    /// Deprecated: superseded by `storage.storage_class`. Still accepted so
    /// older custom resources keep working; [`RuntimeConfigSpec::merged`]
    /// migrates it into `storage` on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,

    /// Deprecated: superseded by `storage.size`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "aim.example.com",
    version = "v1alpha1",
    kind = "AIMClusterRuntimeConfig",
    plural = "aimclusterruntimeconfigs",
    shortname = "aimcrc",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRuntimeConfigSpec {
    #[serde(default)]
    pub engine_args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl RuntimeConfigSpec {
    /// Folds the deprecated flat `storage_class`/`storage_size` fields into
    /// `storage`, giving the nested struct precedence when both are set.
    pub fn migrated_storage(&self) -> Option<StorageConfig> {
        migrate_storage(
            &self.storage,
            self.storage_class.as_deref(),
            self.storage_size.as_deref(),
        )
    }
}

impl ClusterRuntimeConfigSpec {
    pub fn migrated_storage(&self) -> Option<StorageConfig> {
        migrate_storage(
            &self.storage,
            self.storage_class.as_deref(),
            self.storage_size.as_deref(),
        )
    }
}

fn migrate_storage(
    nested: &Option<StorageConfig>,
    deprecated_class: Option<&str>,
    deprecated_size: Option<&str>,
) -> Option<StorageConfig> {
    if nested.is_none() && deprecated_class.is_none() && deprecated_size.is_none() {
        return None;
    }
    let base = nested.clone().unwrap_or_default();
    Some(StorageConfig {
        storage_class: base
            .storage_class
            .or_else(|| deprecated_class.map(str::to_owned)),
        size: base.size.or_else(|| deprecated_size.map(str::to_owned)),
    })
}

/// The effective runtime configuration applied to a template: the result of
/// merging a cluster-scoped config with a namespace-scoped config of the
/// same name, namespace winning field-by-field (§4.7).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveRuntimeConfig {
    pub engine_args: BTreeMap<String, serde_json::Value>,
    pub env: BTreeMap<String, String>,
    pub storage: Option<StorageConfig>,
}

impl EffectiveRuntimeConfig {
    pub fn from_cluster(spec: &ClusterRuntimeConfigSpec) -> Self {
        Self {
            engine_args: spec.engine_args.clone(),
            env: spec.env.clone(),
            storage: spec.migrated_storage(),
        }
    }

    pub fn from_namespace(spec: &RuntimeConfigSpec) -> Self {
        Self {
            engine_args: spec.engine_args.clone(),
            env: spec.env.clone(),
            storage: spec.migrated_storage(),
        }
    }

    /// Merges `self` (cluster) and `other` (namespace) with namespace
    /// precedence, associative over nil on either side (§9 invariant).
    pub fn merge(cluster: Option<Self>, namespace: Option<Self>) -> Option<Self> {
        match (cluster, namespace) {
            (None, None) => None,
            (Some(c), None) => Some(c),
            (None, Some(n)) => Some(n),
            (Some(c), Some(n)) => {
                let mut engine_args = c.engine_args;
                engine_args.extend(n.engine_args);
                let mut env = c.env;
                env.extend(n.env);
                Some(Self {
                    engine_args,
                    env,
                    storage: n.storage.or(c.storage),
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn namespace_overrides_cluster_field_by_field() {
        let cluster = EffectiveRuntimeConfig {
            engine_args: BTreeMap::from([("max_batch".to_owned(), serde_json::json!(8))]),
            env: BTreeMap::from([("LOG_LEVEL".to_owned(), "info".to_owned())]),
            storage: Some(StorageConfig {
                storage_class: Some("standard".to_owned()),
                size: Some("10Gi".to_owned()),
            }),
        };
        let namespace = EffectiveRuntimeConfig {
            engine_args: BTreeMap::from([("max_batch".to_owned(), serde_json::json!(16))]),
            env: BTreeMap::new(),
            storage: None,
        };
        let merged = EffectiveRuntimeConfig::merge(Some(cluster), Some(namespace)).unwrap();
        assert_eq!(merged.engine_args["max_batch"], serde_json::json!(16));
        assert_eq!(merged.env["LOG_LEVEL"], "info");
        assert_eq!(merged.storage.unwrap().storage_class.unwrap(), "standard");
    }

    #[test]
    fn merge_with_nil_on_either_side_is_identity() {
        let only = EffectiveRuntimeConfig {
            engine_args: BTreeMap::from([("k".to_owned(), serde_json::json!(1))]),
            env: BTreeMap::new(),
            storage: None,
        };
        assert_eq!(
            EffectiveRuntimeConfig::merge(Some(only.clone()), None),
            Some(only.clone())
        );
        assert_eq!(EffectiveRuntimeConfig::merge(None, Some(only.clone())), Some(only));
        assert_eq!(EffectiveRuntimeConfig::merge(None, None), None);
    }

    #[test]
    fn deprecated_storage_fields_migrate_when_nested_absent() {
        let spec = RuntimeConfigSpec {
            storage_class: Some("fast".to_owned()),
            storage_size: Some("20Gi".to_owned()),
            ..Default::default()
        };
        let migrated = spec.migrated_storage().unwrap();
        assert_eq!(migrated.storage_class.unwrap(), "fast");
        assert_eq!(migrated.size.unwrap(), "20Gi");
    }
}
