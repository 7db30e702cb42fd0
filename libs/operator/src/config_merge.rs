//! Runtime-Config Merger (§4.7): fetches the cluster-scoped and
//! namespace-scoped configs sharing a name and merges them, namespace
//! winning field-by-field. The "default" name absent everywhere is not an
//! error (§9 Open Question 1); any other missing name is.

use kube::api::Api;
use kube::Client;

use crate::crd::{AIMClusterRuntimeConfig, AIMRuntimeConfig, EffectiveRuntimeConfig};
use crate::error::{Error, Result};

pub const DEFAULT_RUNTIME_CONFIG_NAME: &str = "default";

/// Fetches and merges the runtime config named `name` for `namespace`.
/// Returns `Ok(None)` only when `name == "default"` and neither scope has
/// an entry; any other missing name surfaces as
/// [`Error::MissingUpstreamDependency`].
pub async fn resolve(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<EffectiveRuntimeConfig>> {
    let cluster_api: Api<AIMClusterRuntimeConfig> = Api::all(client.clone());
    let namespace_api: Api<AIMRuntimeConfig> = Api::namespaced(client.clone(), namespace);

    let cluster = match cluster_api.get_opt(name).await.map_err(Error::KubeError)? {
        Some(cfg) => Some(EffectiveRuntimeConfig::from_cluster(&cfg.spec)),
        None => None,
    };
    let namespaced = match namespace_api.get_opt(name).await.map_err(Error::KubeError)? {
        Some(cfg) => Some(EffectiveRuntimeConfig::from_namespace(&cfg.spec)),
        None => None,
    };

    let merged = EffectiveRuntimeConfig::merge(cluster, namespaced);
    if merged.is_none() && name != DEFAULT_RUNTIME_CONFIG_NAME {
        return Err(Error::MissingUpstreamDependency(format!(
            "runtime config \"{name}\" not found in namespace \"{namespace}\" or cluster scope"
        )));
    }
    Ok(merged)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crd::{RuntimeConfigSpec, StorageConfig};
    use std::collections::BTreeMap;

    #[test]
    fn default_missing_everywhere_is_not_an_error_conceptually() {
        // exercised at the EffectiveRuntimeConfig level since the fetch
        // path itself needs a live apiserver; this asserts the merge
        // primitive `resolve` depends on behaves as expected for "nothing
        // found anywhere".
        assert_eq!(EffectiveRuntimeConfig::merge(None, None), None);
    }

    #[test]
    fn namespace_config_alone_is_returned_unmerged() {
        let spec = RuntimeConfigSpec {
            engine_args: BTreeMap::new(),
            env: BTreeMap::from([("A".to_owned(), "1".to_owned())]),
            storage: Some(StorageConfig {
                storage_class: Some("fast".to_owned()),
                size: None,
            }),
            storage_class: None,
            storage_size: None,
        };
        let effective = EffectiveRuntimeConfig::from_namespace(&spec);
        assert_eq!(effective.env["A"], "1");
    }
}
