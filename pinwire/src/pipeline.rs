// pipeline.rs — Model → communication map → firmware, with provenance
//
// Runs the two generation stages in order and records what the output was
// built from. The map fingerprint is the hash of the map's canonical JSON,
// so two builds agree on it exactly when they agree on every index.
//
// Preconditions: none.
// Postconditions: `CompiledFirmware.map` is the map the source was generated
//                 against.
// Failure modes: none.
// Side effects: debug logging of stage timings.

use std::fmt::Write as _;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::codegen::{generate_firmware, CodegenOptions, GeneratedFirmware};
use crate::comm_map::CommMap;
use crate::model::Model;

// ── Provenance ──────────────────────────────────────────────────────────────

/// Build metadata for `build-info` output and stored profiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub map_fingerprint: String,
    pub variables: usize,
    pub cadence_ms: u32,
    pub generator_version: &'static str,
}

impl Provenance {
    pub fn to_json(&self) -> String {
        let mut json = serde_json::to_string_pretty(self).unwrap_or_default();
        json.push('\n');
        json
    }
}

/// SHA-256 of the map's canonical JSON.
pub fn map_fingerprint(map: &CommMap) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(map.canonical_json().as_bytes());
    hasher.finalize().into()
}

/// Hex form of [`map_fingerprint`] (64 characters).
pub fn fingerprint_hex(map: &CommMap) -> String {
    let mut s = String::with_capacity(64);
    for b in map_fingerprint(map) {
        let _ = write!(s, "{:02x}", b);
    }
    s
}

// ── Compile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompiledFirmware {
    pub map: CommMap,
    pub firmware: GeneratedFirmware,
    pub provenance: Provenance,
}

/// Build the map for `model` and generate firmware against it.
pub fn compile(model: &Model, options: &CodegenOptions) -> CompiledFirmware {
    let t = Instant::now();
    let map = CommMap::build(model);
    debug!(
        variables = map.len(),
        elapsed_us = t.elapsed().as_micros() as u64,
        "comm map built"
    );

    let t = Instant::now();
    let firmware = generate_firmware(model, options, &map);
    debug!(
        bytes = firmware.source.len(),
        cadence_ms = options.cadence_ms,
        elapsed_us = t.elapsed().as_micros() as u64,
        "firmware generated"
    );

    let provenance = Provenance {
        map_fingerprint: fingerprint_hex(&map),
        variables: map.len(),
        cadence_ms: options.cadence_ms,
        generator_version: env!("CARGO_PKG_VERSION"),
    };

    CompiledFirmware {
        map,
        firmware,
        provenance,
    }
}
