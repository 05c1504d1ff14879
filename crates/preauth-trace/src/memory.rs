//! In-memory implementation of `TraceWriter`.
//!
//! Open runs are kept in a map keyed by adjudication id. `seal` removes the
//! run, returns its trace, and keeps a copy in a bounded ring of recently
//! sealed traces for later lookup. `discard` drops an open run that will
//! never be sealed; nothing of it is retained.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use preauth_contracts::{
    error::{PreauthError, PreauthResult},
    trace::{DecisionStep, DecisionTrace, TraceEntry},
};
use preauth_core::traits::TraceWriter;

use crate::chain::{hash_step, verify_entries};

/// Sealed traces kept by default.
pub const DEFAULT_RETAINED: usize = 256;

// ── Internal mutable state ────────────────────────────────────────────────────

/// Chain under construction for one run.
#[derive(Default)]
pub(crate) struct OpenChain {
    pub(crate) entries: Vec<TraceEntry>,
}

impl OpenChain {
    fn last_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_else(|| TraceEntry::GENESIS_HASH.to_string())
    }
}

pub(crate) struct TraceState {
    pub(crate) open: HashMap<String, OpenChain>,
    pub(crate) sealed: VecDeque<DecisionTrace>,
}

// ── Public writer ─────────────────────────────────────────────────────────────

/// An append-only, hash-chained trace writer shared by every run.
///
/// Cloning shares the underlying state.
#[derive(Clone)]
pub struct InMemoryTraceWriter {
    pub(crate) state: Arc<Mutex<TraceState>>,
    retained: usize,
}

impl InMemoryTraceWriter {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETAINED)
    }

    /// Keep at most `retained` sealed traces; the oldest are dropped first.
    pub fn with_retention(retained: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(TraceState {
                open: HashMap::new(),
                sealed: VecDeque::new(),
            })),
            retained,
        }
    }

    fn lock(&self) -> PreauthResult<MutexGuard<'_, TraceState>> {
        self.state
            .lock()
            .map_err(|e| PreauthError::store(format!("trace state lock poisoned: {}", e)))
    }

    /// A recently sealed trace, if still retained.
    pub fn sealed(&self, adjudication_id: &str) -> PreauthResult<Option<DecisionTrace>> {
        let state = self.lock()?;
        Ok(state
            .sealed
            .iter()
            .find(|t| t.adjudication_id == adjudication_id)
            .cloned())
    }

    /// Runs appended to but not yet sealed.
    pub fn open_runs(&self) -> PreauthResult<usize> {
        Ok(self.lock()?.open.len())
    }

    /// Re-verify an open run's chain in place.
    pub fn verify_open(&self, adjudication_id: &str) -> PreauthResult<bool> {
        let state = self.lock()?;
        Ok(state
            .open
            .get(adjudication_id)
            .map(|chain| verify_entries(adjudication_id, &chain.entries))
            .unwrap_or(true))
    }
}

impl Default for InMemoryTraceWriter {
    fn default() -> Self {
        Self::new()
    }
}

// ── TraceWriter impl ──────────────────────────────────────────────────────────

impl TraceWriter for InMemoryTraceWriter {
    fn append(&self, adjudication_id: &str, step: &DecisionStep) -> PreauthResult<()> {
        let mut state = self.lock()?;
        let chain = state.open.entry(adjudication_id.to_string()).or_default();

        let sequence = chain.entries.len() as u64;
        let prev_hash = chain.last_hash();
        let this_hash = hash_step(adjudication_id, sequence, step, &prev_hash)?;

        debug!(
            adjudication_id = %adjudication_id,
            sequence,
            layer = %step.layer,
            verdict = %step.verdict,
            "trace step appended"
        );

        chain.entries.push(TraceEntry {
            sequence,
            step: step.clone(),
            prev_hash,
            this_hash,
        });
        Ok(())
    }

    /// Close the run. Sealing a run with no steps yields an empty trace.
    fn seal(&self, adjudication_id: &str) -> PreauthResult<DecisionTrace> {
        let mut state = self.lock()?;
        let chain = state.open.remove(adjudication_id).unwrap_or_default();

        let terminal_hash = chain
            .entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();
        let trace = DecisionTrace {
            adjudication_id: adjudication_id.to_string(),
            entries: chain.entries,
            terminal_hash,
        };

        info!(
            adjudication_id = %adjudication_id,
            steps = trace.entries.len(),
            terminal_hash = %trace.terminal_hash,
            "decision trace sealed"
        );

        if self.retained > 0 {
            while state.sealed.len() >= self.retained {
                state.sealed.pop_front();
            }
            state.sealed.push_back(trace.clone());
        }

        Ok(trace)
    }

    fn discard(&self, adjudication_id: &str) -> PreauthResult<()> {
        let mut state = self.lock()?;
        if let Some(chain) = state.open.remove(adjudication_id) {
            warn!(
                adjudication_id = %adjudication_id,
                steps = chain.entries.len(),
                "open decision trace discarded"
            );
        }
        Ok(())
    }
}
