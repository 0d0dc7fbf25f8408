//! Broadcast completion signal for graph nodes.
//!
//! Many successors must each, independently, observe one predecessor's
//! completion. The signal is a single-capacity semaphore: completion adds
//! the one permit, and every observer acquires it and immediately refills
//! it, so later observers of the same predecessor see the signal too.

use tokio::sync::Semaphore;

/// Single-slot, re-arming completion signal.
pub struct CompletionSignal {
    slot: Semaphore,
}

impl CompletionSignal {
    /// A fresh, unsignalled instance.
    pub fn new() -> Self {
        Self {
            slot: Semaphore::new(0),
        }
    }

    /// Signal completion. At most one pending permit is ever added per run;
    /// observers keep the slot filled after that.
    pub fn notify(&self) {
        self.slot.add_permits(1);
    }

    /// Block until completion is signalled, then immediately re-arm the
    /// signal for the next observer.
    pub async fn observe(&self) {
        // The semaphore is never closed, so acquisition can only succeed.
        if let Ok(permit) = self.slot.acquire().await {
            permit.forget();
            self.slot.add_permits(1);
        }
    }

    /// Drain any stale permit so a prior run's "done" state cannot
    /// short-circuit waits when the graph is re-executed.
    pub fn reset(&self) {
        while let Ok(permit) = self.slot.try_acquire() {
            permit.forget();
        }
    }

    /// True when completion has been signalled and not reset.
    pub fn is_signalled(&self) -> bool {
        self.slot.available_permits() > 0
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}
