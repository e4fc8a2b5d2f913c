use crate::actor::{ActorExited, WeakActorClient};
use crate::replica::election::timers::clock::Clock;
use crate::replica::{LeaderTimerTick, Term};
use std::sync::{Arc, Mutex, Weak};
use tokio::time::{Duration, Instant};

/// What a timer tells the actor when it rings.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Alarm {
    ElectionTimeout(Term),
    Heartbeat(LeaderTimerTick),
}

impl Alarm {
    async fn ring(&self, actor_client: &WeakActorClient) -> Result<(), ActorExited> {
        match self {
            Alarm::ElectionTimeout(term) => actor_client.follower_timeout(*term).await,
            Alarm::Heartbeat(tick) => actor_client.leader_timer(tick.clone()).await,
        }
    }
}

/// The moment a timer rings next. Shared by a timer handle, which pushes it back, and its task,
/// which only holds it weakly so that dropping the handle stops the task.
pub(super) struct Deadline<C: Clock> {
    due: Mutex<Instant>,
    clock: C,
}

impl<C: Clock> Deadline<C> {
    pub(super) fn new(clock: C, due: Instant) -> Arc<Self> {
        Arc::new(Deadline {
            due: Mutex::new(due),
            clock,
        })
    }

    pub(super) fn clock(&self) -> &C {
        &self.clock
    }

    fn due(&self) -> Instant {
        *self.due.lock().expect("Deadline mutex guard poison")
    }

    /// Ring `delay` from now, whether that is earlier or later than currently planned.
    pub(super) fn reset_after(&self, delay: Duration) {
        let due = self.clock.now() + delay;
        *self.due.lock().expect("Deadline mutex guard poison") = due;
    }

    // Only ever moves the deadline later.
    fn push_back_to(&self, due: Instant) {
        let mut current = self.due.lock().expect("Deadline mutex guard poison");
        if *current < due {
            *current = due;
        }
    }
}

/// TimerTask sleeps until the deadline, rings, then waits `rearm_after` before ringing again,
/// unless the handle pushed the deadline back in the meantime.
pub(super) struct TimerTask<C: Clock> {
    deadline: Weak<Deadline<C>>,
    clock: C,
    alarm: Alarm,
    rearm_after: Duration,
    actor_client: WeakActorClient,
}

impl<C: Clock> TimerTask<C> {
    pub(super) fn new(
        deadline: &Arc<Deadline<C>>,
        alarm: Alarm,
        rearm_after: Duration,
        actor_client: WeakActorClient,
    ) -> Self {
        TimerTask {
            deadline: Arc::downgrade(deadline),
            clock: deadline.clock().clone(),
            alarm,
            rearm_after,
            actor_client,
        }
    }

    pub(super) async fn run(self) {
        loop {
            let due = match self.deadline.upgrade() {
                Some(deadline) => deadline.due(),
                None => return,
            };
            self.clock.sleep_until(due).await;

            // Re-read: the handle may have pushed the deadline back, or be gone, while we slept.
            match self.deadline.upgrade() {
                Some(deadline) if deadline.due() <= self.clock.now() => {}
                Some(_) => continue,
                None => return,
            }

            if self.alarm.ring(&self.actor_client).await.is_err() {
                return;
            }

            match self.deadline.upgrade() {
                Some(deadline) => deadline.push_back_to(self.clock.now() + self.rearm_after),
                None => return,
            }
        }
    }
}
