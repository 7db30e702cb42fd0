//! Cluster Inventory Probe (§4 component 1): enumerates nodes and
//! aggregates allocatable GPU capacity by model name. Computed fresh on
//! every read — the pipeline never caches it (§5: "Cluster inventory:
//! read-only during a reconciliation... re-fetched each reconcile").

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;

use crate::error::{Error, Result};

/// Label carrying the human-readable GPU model on a node, e.g.
/// `gpu.example.com/model: MI300X`. Vendor-neutral stand-in for the
/// various device-plugin-specific labels real clusters use.
const GPU_MODEL_LABEL: &str = "gpu.example.com/model";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GpuInventoryEntry {
    /// Allocatable resource name on the node, e.g. "amd.com/gpu".
    pub resource_name: String,
    /// Per-GPU VRAM string as reported by the node label, e.g. "192Gi".
    pub vram: Option<String>,
    /// Allocatable unit count across all nodes advertising this model.
    pub count: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterInventory {
    pub by_model: BTreeMap<String, GpuInventoryEntry>,
}

impl ClusterInventory {
    pub fn get(&self, model: &str) -> Option<&GpuInventoryEntry> {
        self.by_model.get(&normalize_model(model))
    }
}

/// Case-folds and trims a GPU model name. Shared with the hardware
/// matcher (§4.5) so inventory keys and match queries agree.
pub fn normalize_model(model: &str) -> String {
    model.trim().to_lowercase()
}

pub async fn probe(client: &Client) -> Result<ClusterInventory> {
    let nodes: Api<Node> = Api::all(client.clone());
    let list = nodes.list(&ListParams::default()).await.map_err(Error::KubeError)?;

    let mut by_model: BTreeMap<String, GpuInventoryEntry> = BTreeMap::new();
    for node in list.items {
        let Some(model) = node.metadata.labels.as_ref().and_then(|l| l.get(GPU_MODEL_LABEL)) else {
            continue;
        };
        let Some(status) = &node.status else { continue };
        let Some(allocatable) = &status.allocatable else {
            continue;
        };
        for (resource_name, quantity) in allocatable {
            if !is_gpu_resource(resource_name) {
                continue;
            }
            let count: i64 = quantity.0.parse().unwrap_or(0);
            if count <= 0 {
                continue;
            }
            let entry = by_model.entry(normalize_model(model)).or_insert_with(|| GpuInventoryEntry {
                resource_name: resource_name.clone(),
                vram: node
                    .metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get("gpu.example.com/vram"))
                    .cloned(),
                count: 0,
            });
            entry.count += count;
        }
    }
    Ok(ClusterInventory { by_model })
}

fn is_gpu_resource(resource_name: &str) -> bool {
    resource_name.ends_with("/gpu") || resource_name.contains("gpu")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_model_case_folds_and_trims() {
        assert_eq!(normalize_model("  MI300X \n"), "mi300x");
    }

    #[test]
    fn is_gpu_resource_matches_vendor_resource_names() {
        assert!(is_gpu_resource("amd.com/gpu"));
        assert!(is_gpu_resource("nvidia.com/gpu"));
        assert!(!is_gpu_resource("cpu"));
    }
}
