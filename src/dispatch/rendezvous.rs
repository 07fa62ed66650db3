//! Per-transaction wait/complete cell.
//!
//! Owned jointly by the waiting worker and the response demultiplexer; the
//! first side to act wins and the other observes `done` and backs off.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    done: bool,
    payload: Vec<u8>,
}

/// Result of waiting on a rendezvous.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The completer ran first; the response payload is attached.
    Completed(Vec<u8>),
    /// The deadline passed. `done` was set under the lock before returning,
    /// so a late completer will discard its payload.
    TimedOut,
}

/// One-shot rendezvous between a waiter and a completer.
pub struct Rendezvous {
    state: Mutex<State>,
    cond: Condvar,
}

impl Rendezvous {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        }
    }

    /// Attach a payload and mark the rendezvous done. Returns `false` when it
    /// was already completed (or timed out); the payload is then dropped.
    pub fn complete(&self, payload: Vec<u8>) -> bool {
        let mut state = self.state.lock();
        if state.done {
            return false;
        }
        state.done = true;
        state.payload = payload;
        self.cond.notify_one();
        true
    }

    /// Block until completed or `deadline`. Timing out marks the rendezvous
    /// done while still holding the lock.
    pub fn wait_until(&self, deadline: Instant) -> WaitOutcome {
        let mut state = self.state.lock();
        while !state.done {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                // The completer may have slipped in between the timeout and
                // reacquisition of the lock.
                if state.done {
                    break;
                }
                state.done = true;
                return WaitOutcome::TimedOut;
            }
        }
        WaitOutcome::Completed(std::mem::take(&mut state.payload))
    }
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn completion_before_wait_returns_immediately() {
        let rv = Rendezvous::new();
        assert!(rv.complete(b"resp".to_vec()));

        let outcome = rv.wait_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Completed(b"resp".to_vec()));
    }

    #[test]
    fn second_completion_is_rejected() {
        let rv = Rendezvous::new();
        assert!(rv.complete(b"first".to_vec()));
        assert!(!rv.complete(b"second".to_vec()));

        let outcome = rv.wait_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Completed(b"first".to_vec()));
    }

    #[test]
    fn wait_times_out_and_blocks_late_completion() {
        let rv = Rendezvous::new();
        let outcome = rv.wait_until(Instant::now() + Duration::from_millis(10));
        assert_eq!(outcome, WaitOutcome::TimedOut);

        // The timeout claimed the cell; a late response must be discarded.
        assert!(!rv.complete(b"too late".to_vec()));
    }

    #[test]
    fn concurrent_completion_wakes_the_waiter() {
        let rv = Arc::new(Rendezvous::new());
        let completer = {
            let rv = Arc::clone(&rv);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                rv.complete(b"from thread".to_vec())
            })
        };

        let outcome = rv.wait_until(Instant::now() + Duration::from_secs(5));
        assert_eq!(outcome, WaitOutcome::Completed(b"from thread".to_vec()));
        assert!(completer.join().unwrap());
    }
}
