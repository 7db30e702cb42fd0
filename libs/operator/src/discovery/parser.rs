//! Discovery Output Parser (§4.4): extracts a well-formed
//! [`ParsedDiscovery`] from a discovery job's pod logs, which may contain
//! arbitrary leading/trailing stdout+stderr noise.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::crd::common::{DiscoveryProfileStatus, ResolvedModelSource};
use crate::error::{Error, Result};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    #[allow(dead_code)]
    filename: Option<String>,
    profile: RawProfile,
    #[serde(default)]
    models: Vec<RawModel>,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    #[serde(default)]
    #[allow(dead_code)]
    model: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    quantized_model: Option<String>,
    metadata: RawMetadata,
    #[serde(default)]
    engine_args: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    env_vars: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    engine: String,
    #[serde(default)]
    gpu: Option<String>,
    #[serde(default)]
    gpu_count: Option<i32>,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    precision: Option<String>,
    #[serde(default, rename = "type")]
    #[allow(dead_code)]
    type_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    name: String,
    source: String,
    size_gb: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDiscovery {
    pub profile: DiscoveryProfileStatus,
    pub model_sources: Vec<ResolvedModelSource>,
}

/// Parses the buffer per §4.4's two-pass algorithm: whole-buffer parse
/// first, then a backward bracket scan as fallback. Returns
/// [`Error::DiscoveryFailure`] ("no valid JSON array found") if neither
/// pass produces a non-empty array of result objects.
pub fn parse(buf: &[u8]) -> Result<ParsedDiscovery> {
    let text = String::from_utf8_lossy(buf);

    if let Some(results) = try_parse_array(&text) {
        return to_parsed_discovery(results);
    }
    if let Some(results) = scan_backward_for_array(&text) {
        return to_parsed_discovery(results);
    }
    Err(Error::DiscoveryFailure(
        "no valid JSON array found".to_owned(),
    ))
}

fn try_parse_array(text: &str) -> Option<Vec<RawResult>> {
    let results: Vec<RawResult> = serde_json::from_str(text.trim()).ok()?;
    (!results.is_empty()).then_some(results)
}

/// Finds the last `]` in the buffer, then the earliest preceding `[` whose
/// bracketed slice parses as a non-empty JSON array of result objects.
fn scan_backward_for_array(text: &str) -> Option<Vec<RawResult>> {
    let bytes = text.as_bytes();
    let close = bytes.iter().rposition(|&b| b == b']')?;
    for open in (0..=close).rev() {
        if bytes[open] != b'[' {
            continue;
        }
        let slice = &text[open..=close];
        if let Ok(results) = serde_json::from_str::<Vec<RawResult>>(slice) {
            if !results.is_empty() {
                return Some(results);
            }
        }
    }
    None
}

fn to_parsed_discovery(mut results: Vec<RawResult>) -> Result<ParsedDiscovery> {
    let first = results.remove(0);
    let model_sources = first
        .models
        .into_iter()
        .map(|m| ResolvedModelSource {
            model_id: m.name,
            source_uri: m.source,
            size_bytes: (m.size_gb * BYTES_PER_GB).round() as i64,
        })
        .collect();

    Ok(ParsedDiscovery {
        profile: DiscoveryProfileStatus {
            engine: first.profile.metadata.engine,
            gpu: first.profile.metadata.gpu,
            gpu_count: first.profile.metadata.gpu_count,
            metric: first.profile.metadata.metric,
            precision: first.profile.metadata.precision,
            engine_args: first.profile.engine_args,
            env_vars: first.profile.env_vars,
        },
        model_sources,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_log() -> String {
        r#"[{"filename":"profile.json","profile":{"model":"llama3-70b","metadata":{"engine":"vllm","gpu":"MI300X","gpu_count":1,"metric":"throughput","precision":"fp8","type":"optimized"},"engine_args":{"max_batch":16},"env_vars":{"VLLM_LOG":"0"}},"models":[{"name":"llama3-70b","source":"hf://meta/llama3-70b","size_gb":140.0}]}]"#
            .to_owned()
    }

    #[test]
    fn parses_clean_whole_buffer_array() {
        let parsed = parse(sample_log().as_bytes()).unwrap();
        assert_eq!(parsed.profile.engine, "vllm");
        assert_eq!(parsed.model_sources[0].size_bytes, 150323855360);
    }

    #[test]
    fn falls_back_to_backward_scan_with_noise_around_it() {
        let noisy = format!("garbage stderr line\n{}\nmore noise", sample_log());
        let parsed = parse(noisy.as_bytes()).unwrap();
        assert_eq!(parsed.profile.engine, "vllm");
    }

    #[test]
    fn noise_prefix_and_suffix_agree_with_clean_parse() {
        let clean = parse(sample_log().as_bytes()).unwrap();
        let noisy = format!("noise\n{}\nmore noise", sample_log());
        let from_noisy = parse(noisy.as_bytes()).unwrap();
        assert_eq!(clean, from_noisy);
    }

    #[test]
    fn empty_array_is_an_error() {
        assert!(parse(b"[]").is_err());
    }

    #[test]
    fn object_instead_of_array_is_an_error() {
        assert!(parse(b"{\"not\":\"an array\"}").is_err());
    }

    #[test]
    fn unclosed_json_is_an_error() {
        assert!(parse(b"[{\"profile\":").is_err());
    }
}
