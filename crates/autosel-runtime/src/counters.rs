//! Process-wide named counters.
//!
//! The selection engine bumps a counter each time a benchmarking pass
//! actually runs, which makes the counters the primary observable signal for
//! tests and diagnostics. Counters survive across selectors in the same
//! process; tests should [`clear`] them between runs.

use hashbrown::HashMap;

/// Counter bumped once per benchmarking pass that actually ran.
pub const SELECT_ALGORITHM_AUTOTUNE: &str = "select_algorithm_autotune";

static COUNTERS: spin::Mutex<Option<HashMap<String, u64>>> = spin::Mutex::new(None);

/// Increment the named counter by one.
pub fn increment(name: &str) {
    increment_by(name, 1);
}

/// Increment the named counter by the given amount.
pub fn increment_by(name: &str, amount: u64) {
    let mut state = COUNTERS.lock();
    let counters = state.get_or_insert_with(HashMap::new);
    *counters.entry_ref(name).or_insert(0) += amount;
}

/// Current value of the named counter, zero if never incremented.
pub fn get(name: &str) -> u64 {
    let state = COUNTERS.lock();
    state
        .as_ref()
        .and_then(|counters| counters.get(name).copied())
        .unwrap_or(0)
}

/// Reset all counters to zero.
pub fn clear() {
    let mut state = COUNTERS.lock();
    *state = None;
}
