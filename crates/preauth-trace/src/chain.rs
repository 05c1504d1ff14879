//! Hash-chain primitives for the decision trace.
//!
//! Hash input layout (bytes, in order):
//!   1. adjudication_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the step

use sha2::{Digest, Sha256};

use preauth_contracts::{
    error::{PreauthError, PreauthResult},
    trace::{DecisionStep, DecisionTrace, TraceEntry},
};

/// SHA-256 over one entry's position, link, and step. Lowercase hex.
pub fn hash_step(
    adjudication_id: &str,
    sequence: u64,
    step: &DecisionStep,
    prev_hash: &str,
) -> PreauthResult<String> {
    let step_json = serde_json::to_vec(step).map_err(|e| PreauthError::StateMachineError {
        reason: format!("decision step not serializable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(adjudication_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&step_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Check linkage and hashes of `entries` for one run.
///
/// Each entry must sit at its index, link to the previous entry's hash (or
/// the genesis hash), and carry the hash recomputed from its own fields. An
/// empty chain is valid.
pub fn verify_entries(adjudication_id: &str, entries: &[TraceEntry]) -> bool {
    let mut expected_prev = TraceEntry::GENESIS_HASH.to_string();

    for (idx, entry) in entries.iter().enumerate() {
        if entry.sequence != idx as u64 || entry.prev_hash != expected_prev {
            return false;
        }
        match hash_step(adjudication_id, entry.sequence, &entry.step, &entry.prev_hash) {
            Ok(recomputed) if recomputed == entry.this_hash => {}
            _ => return false,
        }
        expected_prev = entry.this_hash.clone();
    }

    true
}

/// Verify a sealed trace, including its terminal hash.
pub fn verify_trace(trace: &DecisionTrace) -> bool {
    let terminal = trace.entries.last().map(|e| e.this_hash.as_str()).unwrap_or("");
    terminal == trace.terminal_hash && verify_entries(&trace.adjudication_id, &trace.entries)
}
