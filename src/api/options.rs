use crate::replica::{ElectionConfig, ReplicaOptions};
use crate::peers::ActorId;
use std::convert::TryFrom;
use tokio::time::Duration;

/// Timing and sizing knobs. Unset values fall back to defaults suited to a LAN cluster.
#[derive(Clone, Debug, Default)]
pub struct RaftOptions {
    pub leader_heartbeat_duration: Option<Duration>,
    pub follower_min_timeout: Option<Duration>,
    pub follower_max_timeout: Option<Duration>,
    // How long a leader waits on a peer's reply before counting it as a refusal.
    pub reply_timeout: Option<Duration>,
    // How long a heartbeat round that reached a majority lets the leader serve lease reads.
    pub lease_duration: Option<Duration>,
    pub snapshot_chunk_size: Option<usize>,
    pub max_entries_per_request: Option<usize>,
    pub actor_queue_size: Option<usize>,
}

#[derive(Clone, Debug)]
pub(super) struct RaftOptionsValidated {
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub reply_timeout: Duration,
    pub lease_duration: Duration,
    pub snapshot_chunk_size: usize,
    pub max_entries_per_request: usize,
    pub actor_queue_size: usize,
}

impl RaftOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.leader_heartbeat_duration >= self.follower_min_timeout {
            return Err("Follower minimum timeout must be greater than leader's heartbeat");
        }
        if self.follower_min_timeout >= self.follower_max_timeout {
            return Err("Follower minimum timeout must be less than maximum timeout");
        }
        if self.reply_timeout >= self.follower_min_timeout {
            return Err("Reply timeout must be less than the follower's minimum timeout");
        }
        // A follower only grants a prevote after this long without the leader, so a lease that
        // outlives it could overlap with the next leader.
        if self.lease_duration >= self.follower_min_timeout {
            return Err("Lease duration must be less than the follower's minimum timeout");
        }
        if self.snapshot_chunk_size == 0 {
            return Err("Snapshot chunk size must be positive");
        }
        if self.max_entries_per_request == 0 {
            return Err("Max entries per request must be positive");
        }
        if self.actor_queue_size == 0 {
            return Err("Actor queue size must be positive");
        }

        Ok(())
    }

    pub(super) fn election_config(&self, my_id: ActorId) -> ElectionConfig {
        ElectionConfig {
            my_id,
            leader_heartbeat_duration: self.leader_heartbeat_duration,
            follower_min_timeout: self.follower_min_timeout,
            follower_max_timeout: self.follower_max_timeout,
        }
    }

    pub(super) fn replica_options(&self) -> ReplicaOptions {
        ReplicaOptions {
            lease_duration: self.lease_duration,
            reply_timeout: self.reply_timeout,
            snapshot_chunk_size: self.snapshot_chunk_size,
            max_entries_per_request: self.max_entries_per_request,
            follower_min_timeout: self.follower_min_timeout,
        }
    }
}

impl TryFrom<RaftOptions> for RaftOptionsValidated {
    type Error = &'static str;

    fn try_from(options: RaftOptions) -> Result<Self, Self::Error> {
        let values = RaftOptionsValidated {
            leader_heartbeat_duration: options.leader_heartbeat_duration.unwrap_or(Duration::from_millis(100)),
            follower_min_timeout: options.follower_min_timeout.unwrap_or(Duration::from_millis(500)),
            follower_max_timeout: options.follower_max_timeout.unwrap_or(Duration::from_millis(1500)),
            reply_timeout: options.reply_timeout.unwrap_or(Duration::from_millis(300)),
            lease_duration: options.lease_duration.unwrap_or(Duration::from_millis(400)),
            snapshot_chunk_size: options.snapshot_chunk_size.unwrap_or(64 * 1024),
            max_entries_per_request: options.max_entries_per_request.unwrap_or(64),
            actor_queue_size: options.actor_queue_size.unwrap_or(64),
        };

        values.validate()?;
        Ok(values)
    }
}
