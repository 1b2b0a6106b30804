//! At-most-one outstanding dispatch

use std::sync::atomic::{AtomicBool, Ordering};

/// Boolean gate held for the duration of a dispatch.
///
/// A second request while the gate is held is rejected, never queued.
#[derive(Debug, Default)]
pub struct DispatchGate {
    busy: AtomicBool,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate, or `None` if a dispatch is already in flight
    pub fn try_acquire(&self) -> Option<GatePass<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GatePass { gate: self })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Proof of holding the gate; releases it on drop, including during unwind
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a DispatchGate,
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let gate = DispatchGate::new();
        let pass = gate.try_acquire().unwrap();
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        assert!(gate.is_busy());

        drop(pass);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let gate = DispatchGate::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _pass = gate.try_acquire().unwrap();
            panic!("dispatch blew up");
        }));
        assert!(result.is_err());
        assert!(!gate.is_busy());
    }
}
