//! Tracks the cancellation token for each Run currently executing, so a
//! stop request arriving over the Control Plane API can reach into whatever
//! worker owns that Run without the two having any other shared state.

use agent_runner_core::RunId;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RunCancelRegistry {
    tokens: Mutex<HashMap<RunId, CancellationToken>>,
}

impl RunCancelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the token for `run_id`, creating one if this is the first
    /// call for it.
    pub fn token_for(&self, run_id: RunId) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap()
            .entry(run_id)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Drops the registered token for a Run that has reached a terminal
    /// state; cancelling a token after this has no further effect.
    pub fn remove(&self, run_id: RunId) {
        self.tokens.lock().unwrap().remove(&run_id);
    }

    /// Signals the Run's token if one is registered. Returns `false` if the
    /// Run is not currently known to any worker (not running here).
    pub fn signal_stop(&self, run_id: RunId) -> bool {
        match self.tokens.lock().unwrap().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_id() -> RunId {
        RunId::new()
    }

    #[test]
    fn signal_stop_returns_false_when_unknown() {
        let registry = RunCancelRegistry::new();
        assert!(!registry.signal_stop(run_id()));
    }

    #[test]
    fn token_for_is_stable_and_cancellable() {
        let registry = RunCancelRegistry::new();
        let id = run_id();
        let token_a = registry.token_for(id);
        let token_b = registry.token_for(id);
        assert!(registry.signal_stop(id));
        assert!(token_a.is_cancelled());
        assert!(token_b.is_cancelled());
    }
}
