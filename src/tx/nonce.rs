//! Nonce management for reliable transaction submission
//!
//! Handles:
//! - Local nonce tracking for one signing key
//! - Reuse of nonces released by abandoned attempts before advancing further

use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// Nonce state for one key
struct NonceState {
    /// Next never-issued nonce
    next: u64,
    /// Released nonces below `next`, sorted ascending, no duplicates
    gaps: VecDeque<u64>,
}

/// Issues nonces for a single signing key
pub struct NonceManager {
    state: Mutex<NonceState>,
}

impl NonceManager {
    /// Create a new nonce manager starting at `start`
    pub fn new(start: u64) -> Self {
        Self {
            state: Mutex::new(NonceState {
                next: start,
                gaps: VecDeque::new(),
            }),
        }
    }

    /// Get the next nonce, preferring the smallest released one
    pub fn next(&self) -> u64 {
        let mut state = self.state.lock();
        if let Some(gap) = state.gaps.pop_front() {
            debug!("Reusing nonce gap {}", gap);
            return gap;
        }
        let nonce = state.next;
        state.next += 1;
        debug!("Allocated nonce {}", nonce);
        nonce
    }

    /// Release a nonce so the next allocation reuses it
    pub fn insert_gap(&self, nonce: u64) {
        let mut state = self.state.lock();
        if nonce >= state.next {
            return;
        }
        if let Err(idx) = state.gaps.binary_search(&nonce) {
            state.gaps.insert(idx, nonce);
            debug!("Registered nonce gap {}", nonce);
        }
    }

    /// Number of released nonces waiting for reuse
    pub fn gap_count(&self) -> usize {
        self.state.lock().gaps.len()
    }
}
