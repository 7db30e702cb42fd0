//! Hardware Matcher (§4.5): decides whether a template's GPU requirement
//! is satisfiable by the cluster inventory probed in [`crate::inventory`].

use crate::crd::common::{GpuSpec, ResolvedHardware};
use crate::inventory::{normalize_model, ClusterInventory};

/// Formats `status.hardwareSummary` (§4.6, e.g. `"2 x MI300X"`). Total
/// over every resolved-hardware value, per §8's round-trip law.
pub fn summarize(resolved: &ResolvedHardware) -> String {
    match (&resolved.gpu_model, resolved.gpu_count) {
        (Some(model), Some(count)) => format!("{count} x {model}"),
        (Some(model), None) => model.clone(),
        (None, Some(count)) => format!("{count} x GPU"),
        (None, None) => "no GPU".to_owned(),
    }
}

/// Family aliases resolved before comparison, e.g. a shorthand accepted
/// alongside a vendor's full model string.
const MODEL_ALIASES: &[(&str, &str)] = &[("mi300", "mi300x"), ("h100-sxm", "h100")];

/// Whether `models` actually constrains anything. A vec containing only
/// blank entries (e.g. `[""]`) is equivalent to no constraint at all.
fn has_model_constraint(models: &[String]) -> bool {
    models.iter().any(|m| !m.trim().is_empty())
}

fn resolve_alias(model: &str) -> String {
    let normalized = normalize_model(model);
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available {
        model: Option<String>,
        resource_name: Option<String>,
    },
    Unavailable {
        reason: String,
    },
}

/// Parses a VRAM string like "192Gi" into bytes. Returns `None` on
/// malformed input rather than erroring — callers treat unparsable VRAM
/// as "unknown, don't filter on it".
pub fn parse_vram(vram: &str) -> Option<u64> {
    let trimmed = vram.trim();
    let (number, unit) = trimmed.split_at(
        trimmed
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(trimmed.len()),
    );
    let value: f64 = number.parse().ok()?;
    let multiplier: f64 = match unit {
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Ti" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "G" => 1_000_000_000.0,
        "M" => 1_000_000.0,
        "" => 1.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Evaluates §4.5's contract against pre-fetched inventory. Pure: no I/O.
pub fn matches(gpu: Option<&GpuSpec>, inventory: &ClusterInventory) -> Availability {
    let Some(gpu) = gpu else {
        return Availability::Available {
            model: None,
            resource_name: None,
        };
    };
    if gpu.requests <= 0 && !has_model_constraint(&gpu.models) {
        return Availability::Available {
            model: None,
            resource_name: None,
        };
    }

    let min_vram = gpu.min_vram.as_deref().and_then(parse_vram);

    if !has_model_constraint(&gpu.models) {
        // "any model acceptable" — the first inventory entry meeting the
        // VRAM floor (if any) satisfies the request.
        return inventory
            .by_model
            .iter()
            .find(|(_, entry)| {
                entry.count > 0
                    && min_vram.map_or(true, |min| {
                        entry.vram.as_deref().and_then(parse_vram).is_some_and(|v| v >= min)
                    })
            })
            .map(|(model, entry)| Availability::Available {
                model: Some(model.clone()),
                resource_name: Some(entry.resource_name.clone()),
            })
            .unwrap_or(Availability::Unavailable {
                reason: "no GPU available in cluster".to_owned(),
            });
    }

    for requested in gpu.models.iter().filter(|m| !m.trim().is_empty()) {
        let canonical = resolve_alias(requested);
        if let Some(entry) = inventory.get(&canonical) {
            let vram_ok = min_vram.map_or(true, |min| {
                entry.vram.as_deref().and_then(parse_vram).is_some_and(|v| v >= min)
            });
            if entry.count > 0 && vram_ok {
                return Availability::Available {
                    model: Some(canonical),
                    resource_name: Some(entry.resource_name.clone()),
                };
            }
        }
    }
    Availability::Unavailable {
        reason: format!(
            "none of the requested GPU models ({}) are available with sufficient VRAM",
            gpu.models.join(", ")
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inventory::GpuInventoryEntry;
    use std::collections::BTreeMap;

    fn inventory_with(model: &str, resource_name: &str, vram: &str, count: i64) -> ClusterInventory {
        let mut by_model = BTreeMap::new();
        by_model.insert(
            normalize_model(model),
            GpuInventoryEntry {
                resource_name: resource_name.to_owned(),
                vram: Some(vram.to_owned()),
                count,
            },
        );
        ClusterInventory { by_model }
    }

    #[test]
    fn no_gpu_requirement_is_always_available() {
        assert_eq!(
            matches(None, &ClusterInventory::default()),
            Availability::Available {
                model: None,
                resource_name: None
            }
        );
    }

    #[test]
    fn empty_model_with_requests_means_any_gpu() {
        let gpu = GpuSpec {
            models: vec![],
            requests: 1,
            min_vram: None,
            resource_name: None,
        };
        let inventory = inventory_with("MI300X", "amd.com/gpu", "192Gi", 4);
        assert!(matches!(
            matches(Some(&gpu), &inventory),
            Availability::Available { .. }
        ));
    }

    #[test]
    fn blank_model_entry_with_requests_means_any_gpu() {
        let gpu = GpuSpec {
            models: vec!["".to_owned()],
            requests: 1,
            min_vram: None,
            resource_name: None,
        };
        let inventory = inventory_with("MI300X", "amd.com/gpu", "192Gi", 4);
        assert!(matches!(
            matches(Some(&gpu), &inventory),
            Availability::Available { .. }
        ));
    }

    #[test]
    fn model_name_is_normalized_case_and_whitespace() {
        let gpu = GpuSpec {
            models: vec!["  mi300x \n".to_owned()],
            requests: 1,
            min_vram: None,
            resource_name: None,
        };
        let inventory = inventory_with("MI300X", "amd.com/gpu", "192Gi", 4);
        assert!(matches!(
            matches(Some(&gpu), &inventory),
            Availability::Available { .. }
        ));
    }

    #[test]
    fn insufficient_vram_is_unavailable() {
        let gpu = GpuSpec {
            models: vec!["MI300X".to_owned()],
            requests: 1,
            min_vram: Some("256Gi".to_owned()),
            resource_name: None,
        };
        let inventory = inventory_with("MI300X", "amd.com/gpu", "192Gi", 4);
        assert!(matches!(
            matches(Some(&gpu), &inventory),
            Availability::Unavailable { .. }
        ));
    }

    #[test]
    fn vram_string_parses_binary_si_units() {
        assert_eq!(parse_vram("192Gi"), Some(192 * 1024 * 1024 * 1024));
        assert_eq!(parse_vram("bogus"), None);
    }

    #[test]
    fn summarize_is_never_empty() {
        assert_eq!(
            summarize(&ResolvedHardware {
                gpu_model: Some("MI300X".to_owned()),
                gpu_count: Some(2),
                min_vram: None,
                resource_name: None,
            }),
            "2 x MI300X"
        );
        assert_eq!(summarize(&ResolvedHardware::default()), "no GPU");
    }
}
