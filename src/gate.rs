//! Bounded-call gate
//!
//! A foreign call can block its OS thread the way a syscall does; left
//! unbounded, a burst of such calls forces the scheduler to keep spawning
//! threads to stay responsive. The gate is a fixed-capacity counting
//! semaphore taken around every outbound foreign call, bounding the
//! in-flight count and therefore the thread growth.

use parking_lot::{Condvar, Mutex};

/// Fallback permit count when available parallelism reports one or fewer.
const MIN_PERMITS: usize = 4;

/// Counting semaphore bounding concurrently in-flight foreign calls.
pub struct CallGate {
    /// Free permits.
    permits: Mutex<usize>,
    /// Signalled when a permit is returned.
    freed: Condvar,
    /// Configured capacity.
    capacity: usize,
}

impl CallGate {
    /// Create a gate with an explicit permit count.
    pub fn new(permits: usize) -> Self {
        assert!(permits > 0, "call gate requires at least one permit");
        Self {
            permits: Mutex::new(permits),
            freed: Condvar::new(),
            capacity: permits,
        }
    }

    /// Create a gate sized to the machine: one permit per available
    /// execution unit. [`MIN_PERMITS`] applies only when parallelism
    /// reports one or fewer; a 2-core machine gets 2 permits, not 4.
    pub fn with_default_permits() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if parallelism <= 1 {
            Self::new(MIN_PERMITS)
        } else {
            Self::new(parallelism)
        }
    }

    /// Block until a permit is available and take it.
    ///
    /// The returned guard releases the permit when dropped, on every exit
    /// path including panics. Acquisition cannot fail; it only blocks.
    /// Callers needing a deadline race this against their own timer and
    /// must still drop the guard if the acquire wins after the timeout.
    pub fn acquire(&self) -> CallPermit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.freed.wait(&mut permits);
        }
        *permits -= 1;
        CallPermit { gate: self }
    }

    /// Take a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(CallPermit { gate: self })
    }

    /// Current number of free permits.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    /// Configured permit count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        debug_assert!(*permits <= self.capacity, "call gate over-released");
        self.freed.notify_one();
    }
}

/// A transient permit for one foreign call. Returned to the gate on drop.
pub struct CallPermit<'a> {
    gate: &'a CallGate,
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_acquire_release_cycle() {
        let gate = CallGate::new(2);
        assert_eq!(gate.available(), 2);

        let p1 = gate.acquire();
        let p2 = gate.acquire();
        assert_eq!(gate.available(), 0);
        assert!(gate.try_acquire().is_none());

        drop(p1);
        assert_eq!(gate.available(), 1);
        drop(p2);
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn test_permit_released_on_panic() {
        let gate = Arc::new(CallGate::new(1));

        let gate2 = Arc::clone(&gate);
        let result = std::thread::spawn(move || {
            let _permit = gate2.acquire();
            panic!("boom");
        })
        .join();
        assert!(result.is_err());

        // The panicking thread's permit must have been returned.
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_boundedness_under_contention() {
        const PERMITS: usize = 3;
        const CALLERS: usize = 10;

        let gate = Arc::new(CallGate::new(PERMITS));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..CALLERS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                std::thread::spawn(move || {
                    let _permit = gate.acquire();
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(10));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= PERMITS);
        assert_eq!(gate.available(), PERMITS);
    }

    #[test]
    fn test_default_permits_track_parallelism() {
        let gate = CallGate::with_default_permits();
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        // One permit per execution unit; the floor of 4 kicks in only
        // when the machine reports no real parallelism.
        let expected = if parallelism <= 1 { 4 } else { parallelism };
        assert_eq!(gate.capacity(), expected);
    }
}
