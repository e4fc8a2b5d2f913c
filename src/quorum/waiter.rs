use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

/// Waiter is the shared tally for one proposal. Every attempt reports exactly once; the decision
/// sender and the finish sender are each taken at most once.
pub(super) struct Waiter {
    participants: usize,
    majority: usize,
    successes: AtomicUsize,
    errors: AtomicUsize,
    remaining: AtomicUsize,
    decision: Mutex<Option<oneshot::Sender<bool>>>,
    finished: Mutex<Option<oneshot::Sender<()>>>,
}

impl Waiter {
    pub(super) fn new(participants: usize) -> (Self, oneshot::Receiver<bool>, oneshot::Receiver<()>) {
        let (decision_tx, decision_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();

        let waiter = Waiter {
            participants,
            majority: majority_of(participants),
            successes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            remaining: AtomicUsize::new(participants),
            decision: Mutex::new(Some(decision_tx)),
            finished: Mutex::new(Some(finished_tx)),
        };

        if participants == 0 {
            waiter.decide(false);
            waiter.finish();
        }

        (waiter, decision_rx, finished_rx)
    }

    pub(super) fn majority(&self) -> usize {
        self.majority
    }

    pub(super) fn report(&self, succeeded: bool) {
        if succeeded {
            let successes = self.successes.fetch_add(1, Ordering::AcqRel) + 1;
            if successes == self.majority {
                self.decide(true);
            }
        } else {
            let errors = self.errors.fetch_add(1, Ordering::AcqRel) + 1;
            if self.participants - errors < self.majority {
                self.decide(false);
            }
        }

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn decide(&self, outcome: bool) {
        let sender = self.decision.lock().expect("Waiter.decide() mutex guard poison").take();
        if let Some(sender) = sender {
            // The caller may have abandoned the decision. That's fine.
            let _ = sender.send(outcome);
        }
    }

    fn finish(&self) {
        let sender = self.finished.lock().expect("Waiter.finish() mutex guard poison").take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }
}

/// Strictly more than half of `participants`.
pub fn majority_of(participants: usize) -> usize {
    participants / 2 + 1
}
