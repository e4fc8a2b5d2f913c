//! Election and heartbeat timers. Each timer is a background task that rings the replica actor
//! when its deadline passes, and exits once its handle is dropped.
mod alarm;
mod clock;
mod election_timer;
mod heartbeat_timer;

#[cfg(test)]
mod recorder;

pub(super) use election_timer::ElectionTimer;
pub(super) use heartbeat_timer::HeartbeatTimer;
