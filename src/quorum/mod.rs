//! Quorum fan-out: run one proposal against N proposers concurrently and decide as soon as a
//! majority succeeds or can no longer succeed.
mod waiter;

use crate::peers::TransportError;
use std::sync::Arc;
use tokio::sync::oneshot;
use waiter::Waiter;

pub use waiter::majority_of;

#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error("remote peer unreachable: {0}")]
    Transport(#[from] TransportError),
    #[error("local consensus actor has exited")]
    ActorExited,
}

/// QuorumProposer is one participant of a quorum. `Ok(true)` counts as a success; `Ok(false)`,
/// an error or a panic all count as a failure.
#[async_trait::async_trait]
pub trait QuorumProposer<P>: Send + Sync {
    async fn propose(&self, proposal: P) -> Result<bool, ProposeError>;
}

pub struct QuorumHandle {
    majority: usize,
    decision: oneshot::Receiver<bool>,
    finished: oneshot::Receiver<()>,
}

impl QuorumHandle {
    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn split(self) -> (QuorumDecision, QuorumFinished) {
        (
            QuorumDecision { rx: self.decision },
            QuorumFinished { rx: self.finished },
        )
    }
}

pub struct QuorumDecision {
    rx: oneshot::Receiver<bool>,
}

impl QuorumDecision {
    /// `true` once a majority succeeded, `false` once that became impossible.
    pub async fn wait(self) -> bool {
        self.rx.await.unwrap_or(false)
    }
}

pub struct QuorumFinished {
    rx: oneshot::Receiver<()>,
}

impl QuorumFinished {
    /// Resolves once every proposer has reported.
    pub async fn wait(self) {
        let _ = self.rx.await;
    }
}

/// `propose()` invokes every proposer exactly once, each on its own task, and returns immediately.
/// Dropping the handle never cancels in-flight attempts.
pub fn propose<P, I>(proposers: I, proposal: P) -> QuorumHandle
where
    P: Clone + Send + 'static,
    I: IntoIterator<Item = Arc<dyn QuorumProposer<P>>>,
{
    let proposers: Vec<_> = proposers.into_iter().collect();
    let (waiter, decision, finished) = Waiter::new(proposers.len());
    let majority = waiter.majority();
    let waiter = Arc::new(waiter);

    for proposer in proposers {
        let waiter = waiter.clone();
        let proposal = proposal.clone();
        tokio::task::spawn(async move {
            // Inner task so that a panicking proposer surfaces as a JoinError.
            let attempt = tokio::task::spawn(async move { proposer.propose(proposal).await });
            let succeeded = matches!(attempt.await, Ok(Ok(true)));
            waiter.report(succeeded);
        });
    }

    QuorumHandle {
        majority,
        decision,
        finished,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    enum Outcome {
        Succeed,
        Fail,
        Error,
        Panic,
        Hang,
    }

    struct ScriptedProposer {
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl QuorumProposer<u32> for ScriptedProposer {
        async fn propose(&self, proposal: u32) -> Result<bool, ProposeError> {
            assert_eq!(proposal, 42);
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome {
                Outcome::Succeed => Ok(true),
                Outcome::Fail => Ok(false),
                Outcome::Error => Err(ProposeError::ActorExited),
                Outcome::Panic => panic!("proposer blew up"),
                Outcome::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn proposers(outcomes: Vec<Outcome>) -> (Vec<Arc<dyn QuorumProposer<u32>>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let proposers = outcomes
            .into_iter()
            .map(|outcome| {
                Arc::new(ScriptedProposer {
                    outcome,
                    calls: calls.clone(),
                }) as Arc<dyn QuorumProposer<u32>>
            })
            .collect();
        (proposers, calls)
    }

    const SANITY: Duration = Duration::from_secs(5);
    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn majority_of_successes_decides_true_with_rest_pending() {
        use Outcome::*;
        let (proposers, calls) = proposers(vec![Succeed, Succeed, Succeed, Hang, Hang]);

        let handle = propose(proposers, 42);
        assert_eq!(handle.majority(), 3);
        let (decision, finished) = handle.split();

        assert!(timeout(SANITY, decision.wait()).await.unwrap());
        // Two proposers never report, so the finish signal must not fire.
        assert!(timeout(SHORT, finished.wait()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn below_majority_never_decides_true() {
        use Outcome::*;
        let (proposers, _) = proposers(vec![Succeed, Succeed, Hang, Hang, Hang]);

        let (decision, _finished) = propose(proposers, 42).split();

        assert!(timeout(SHORT, decision.wait()).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_majority_decides_false_and_finishes() {
        use Outcome::*;
        let (proposers, _) = proposers(vec![Succeed, Succeed, Fail, Error, Panic]);

        let (decision, finished) = propose(proposers, 42).split();

        assert!(!timeout(SANITY, decision.wait()).await.unwrap());
        timeout(SANITY, finished.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn even_participants_fail_once_two_of_four_fail() {
        use Outcome::*;
        let (proposers, _) = proposers(vec![Fail, Error, Hang, Hang]);

        let (decision, _finished) = propose(proposers, 42).split();

        assert!(!timeout(SANITY, decision.wait()).await.unwrap());
    }

    #[tokio::test]
    async fn no_participants_fails_immediately() {
        let (decision, finished) = propose(Vec::<Arc<dyn QuorumProposer<u32>>>::new(), 42).split();

        assert!(!timeout(SANITY, decision.wait()).await.unwrap());
        timeout(SANITY, finished.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_decision_still_runs_every_proposer() {
        use Outcome::*;
        let (proposers, calls) = proposers(vec![Succeed, Fail, Succeed]);

        let (decision, finished) = propose(proposers, 42).split();
        drop(decision);

        timeout(SANITY, finished.wait()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
