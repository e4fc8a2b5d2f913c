use crate::actor::WeakActorClient;
use crate::replica::election::timers::alarm::{Alarm, Deadline, TimerTask};
use crate::replica::election::timers::clock::{Clock, TokioClock};
use crate::replica::Term;
use rand::Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::time::Duration;

/// ElectionTimer rings `FollowerTimeout(term)` when no leader showed up for a random duration
/// within the timeout range. While nobody postpones it, it keeps ringing every minimum timeout so
/// that a stalled prevote or election is retried.
pub(crate) struct ElectionTimer<C: Clock = TokioClock> {
    deadline: Arc<Deadline<C>>,
    timeout_range: RangeInclusive<Duration>,
}

impl ElectionTimer {
    pub(crate) fn start(
        min_timeout: Duration,
        max_timeout: Duration,
        actor_client: WeakActorClient,
        term: Term,
    ) -> Self {
        let (timer, task) = ElectionTimer::new(min_timeout..=max_timeout, actor_client, term, TokioClock);
        tokio::spawn(task.run());

        timer
    }
}

impl<C: Clock> ElectionTimer<C> {
    fn new(
        timeout_range: RangeInclusive<Duration>,
        actor_client: WeakActorClient,
        term: Term,
        clock: C,
    ) -> (Self, TimerTask<C>) {
        let first_due = clock.now() + random_timeout(&timeout_range);
        let deadline = Deadline::new(clock, first_due);
        let task = TimerTask::new(
            &deadline,
            Alarm::ElectionTimeout(term),
            *timeout_range.start(),
            actor_client,
        );

        (ElectionTimer { deadline, timeout_range }, task)
    }

    /// A leader reached us. Start counting again from now.
    pub(crate) fn postpone(&self) {
        self.deadline.reset_after(random_timeout(&self.timeout_range));
    }
}

fn random_timeout(range: &RangeInclusive<Duration>) -> Duration {
    rand::thread_rng().gen_range(range.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorClient;
    use crate::replica::election::timers::clock::{manual_clock, ManualClock, ManualClockDriver};
    use crate::replica::election::timers::recorder::EventRecorder;

    const TERM: Term = Term::new(7);
    const TIMEOUT: Duration = Duration::from_millis(200);

    // No jitter, so that deadlines are exact.
    fn fixed_timer() -> (ElectionTimer<ManualClock>, ManualClockDriver, EventRecorder, ActorClient) {
        let (client, rx) = ActorClient::new(8);
        let (clock, driver) = manual_clock();
        let (timer, task) = ElectionTimer::new(TIMEOUT..=TIMEOUT, client.weak(), TERM, clock);
        tokio::spawn(task.run());

        (timer, driver, EventRecorder::new(rx), client)
    }

    #[tokio::test]
    async fn postponing_keeps_the_timer_quiet() {
        let (timer, mut driver, mut recorder, _client) = fixed_timer();

        for _ in 0..4 {
            driver.advance(TIMEOUT * 3 / 4);
            timer.postpone();
        }
        recorder.expect_silence().await;

        // Last postponed at 600ms, due at 800ms.
        driver.advance(TIMEOUT - Duration::from_millis(1));
        recorder.expect_silence().await;
        driver.advance(Duration::from_millis(1));
        recorder.expect_election_timeout(TERM).await;
        assert_eq!(driver.elapsed(), TIMEOUT * 4);
    }

    #[tokio::test]
    async fn keeps_ringing_until_someone_listens() {
        let (timer, mut driver, mut recorder, _client) = fixed_timer();

        driver.advance(TIMEOUT);
        recorder.expect_election_timeout(TERM).await;
        recorder.expect_silence().await;

        driver.advance(TIMEOUT);
        recorder.expect_election_timeout(TERM).await;

        // Postponing after it rang still works.
        timer.postpone();
        driver.advance(TIMEOUT / 2);
        recorder.expect_silence().await;
    }

    #[tokio::test]
    async fn dropping_the_timer_stops_it() {
        let (client, rx) = ActorClient::new(8);
        let (clock, mut driver) = manual_clock();
        let (timer, task) = ElectionTimer::new(TIMEOUT..=TIMEOUT, client.weak(), TERM, clock);
        let task = tokio::spawn(task.run());
        let mut recorder = EventRecorder::new(rx);

        drop(timer);
        driver.advance(TIMEOUT * 2);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("Timer task kept running")
            .unwrap();
        recorder.expect_silence().await;
    }
}
