use tokio::time::Instant;

#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep_until(&self, deadline: Instant);
}

#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(super) use manual::{manual_clock, ManualClock, ManualClockDriver};

#[cfg(test)]
mod manual {
    use super::Clock;
    use tokio::sync::watch;
    use tokio::time::{Duration, Instant};

    /// A clock that only moves when its driver says so. Sleepers wake on every move and check
    /// whether their deadline has passed.
    pub(in crate::replica::election::timers) fn manual_clock() -> (ManualClock, ManualClockDriver) {
        let start = Instant::now();
        let (tx, rx) = watch::channel(start);

        (ManualClock { now: rx }, ManualClockDriver { now: tx, start })
    }

    #[derive(Clone)]
    pub(in crate::replica::election::timers) struct ManualClock {
        now: watch::Receiver<Instant>,
    }

    #[async_trait::async_trait]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.borrow()
        }

        async fn sleep_until(&self, deadline: Instant) {
            let mut now = self.now.clone();
            while *now.borrow() < deadline {
                // A gone driver means time stopped. Sleep forever, like a real clock would never
                // wake a task whose runtime shut down.
                if now.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    pub(in crate::replica::election::timers) struct ManualClockDriver {
        now: watch::Sender<Instant>,
        start: Instant,
    }

    impl ManualClockDriver {
        /// Move time forward in one step. Sleepers whose deadline lies anywhere in the step wake
        /// once, at the end of it.
        pub(in crate::replica::election::timers) fn advance(&mut self, step: Duration) {
            let next = *self.now.borrow() + step;
            self.now.send_replace(next);
        }

        pub(in crate::replica::election::timers) fn elapsed(&self) -> Duration {
            *self.now.borrow() - self.start
        }
    }

    #[tokio::test]
    async fn sleepers_wake_only_once_their_deadline_passed() {
        let (clock, mut driver) = manual_clock();
        let deadline = clock.now() + Duration::from_millis(300);

        let sleeper = tokio::spawn({
            let clock = clock.clone();
            async move { clock.sleep_until(deadline).await }
        });

        driver.advance(Duration::from_millis(299));
        tokio::task::yield_now().await;
        assert!(!sleeper.is_finished());

        driver.advance(Duration::from_millis(1));
        tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("Sleeper never woke")
            .unwrap();
        assert_eq!(driver.elapsed(), Duration::from_millis(300));
    }
}
