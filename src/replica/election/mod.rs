mod election_state;
mod leader_state;
mod records;
mod timers;

pub(crate) use election_state::ElectionConfig;
pub(crate) use election_state::ElectionState;
pub(crate) use leader_state::LeaderStateTracker;
pub(crate) use leader_state::PeerState;
pub(crate) use records::ElectionRecord;
pub(crate) use records::LeaseStatus;
