//! The process-local `ClientTransactionID` counter (§3 `TransactionCounter`).

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonically increasing 32-bit client-transaction id attached to every
/// outbound Alpaca request. Never decremented; wraps at `2^31` per §3.
#[derive(Debug)]
pub(crate) struct TransactionCounter(AtomicU32);

const WRAP_AT: u32 = 1 << 31;

impl TransactionCounter {
    pub(crate) const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Returns the next transaction id, strictly greater than every id
    /// returned previously (modulo the documented wraparound).
    pub(crate) fn next(&self) -> u32 {
        self.0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(if current >= WRAP_AT { 1 } else { current + 1 })
            })
            .map_or(1, |previous| {
                if previous >= WRAP_AT {
                    1
                } else {
                    previous + 1
                }
            })
    }
}

impl Default for TransactionCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strictly_increasing() {
        let counter = TransactionCounter::new();
        let mut previous = 0;
        for _ in 0..1000 {
            let next = counter.next();
            assert!(next > previous);
            previous = next;
        }
    }
}
