use crate::actor::WeakActorClient;
use crate::replica::election::timers::alarm::{Alarm, Deadline, TimerTask};
use crate::replica::election::timers::clock::{Clock, TokioClock};
use crate::replica::{LeaderTimerTick, Term};
use std::sync::Arc;
use tokio::time::Duration;

/// HeartbeatTimer asks the leader for a heartbeat round once per interval. It rings right away so
/// a new leader announces itself and starts its lease without delay. Rounds started for other
/// reasons (a write) postpone it.
pub(crate) struct HeartbeatTimer<C: Clock = TokioClock> {
    deadline: Arc<Deadline<C>>,
    interval: Duration,
}

impl HeartbeatTimer {
    pub(crate) fn start(interval: Duration, actor_client: WeakActorClient, term: Term) -> Self {
        let (timer, task) = HeartbeatTimer::new(interval, actor_client, term, TokioClock);
        tokio::spawn(task.run());

        timer
    }
}

impl<C: Clock> HeartbeatTimer<C> {
    fn new(interval: Duration, actor_client: WeakActorClient, term: Term, clock: C) -> (Self, TimerTask<C>) {
        let now = clock.now();
        let deadline = Deadline::new(clock, now);
        let task = TimerTask::new(
            &deadline,
            Alarm::Heartbeat(LeaderTimerTick { term }),
            interval,
            actor_client,
        );

        (HeartbeatTimer { deadline, interval }, task)
    }

    pub(crate) fn postpone(&self) {
        self.deadline.reset_after(self.interval);
    }
}
