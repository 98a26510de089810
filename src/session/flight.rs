use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide single-flight coordinator: at most one stream is in flight
/// across every controller that shares it. Concurrent requests are
/// rejected, not queued.
#[derive(Debug, Default)]
pub struct SingleFlight {
    active: AtomicBool,
    bootstrapped: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flight slot; false if another stream holds it.
    pub fn try_acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// True exactly once per coordinator: the first caller runs the bootstrap session.
    pub fn claim_bootstrap(&self) -> bool {
        !self.bootstrapped.swap(true, Ordering::AcqRel)
    }
}

lazy_static::lazy_static! {
    /// Coordinator shared by every controller that is not given its own
    pub static ref GLOBAL_FLIGHT: Arc<SingleFlight> = Arc::new(SingleFlight::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_acquire_release() {
        let flight = SingleFlight::new();
        assert!(flight.try_acquire());
        assert!(flight.is_active());
        assert!(!flight.try_acquire());
        flight.release();
        assert!(!flight.is_active());
        assert!(flight.try_acquire());
    }

    #[test]
    fn test_bootstrap_claimed_once() {
        let flight = SingleFlight::new();
        assert!(flight.claim_bootstrap());
        assert!(!flight.claim_bootstrap());
    }

    #[test]
    fn test_only_one_thread_acquires() {
        let flight = Arc::new(SingleFlight::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let f = Arc::clone(&flight);
                thread::spawn(move || f.try_acquire())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
