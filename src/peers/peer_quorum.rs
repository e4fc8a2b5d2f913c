use crate::peers::{ActorId, RemoteActor, RemoteActorFactory};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// PeerQuorum is the set of remote voters a node broadcasts to. It is never mutated once in use:
/// a membership change builds a new one and swaps the `Arc`.
#[derive(Clone, Default)]
pub struct PeerQuorum {
    remotes: BTreeMap<ActorId, Arc<dyn RemoteActor>>,
}

impl PeerQuorum {
    pub fn new() -> Self {
        PeerQuorum::default()
    }

    pub fn with_member(mut self, id: ActorId, remote: Arc<dyn RemoteActor>) -> Self {
        self.remotes.insert(id, remote);
        self
    }

    pub fn without_member(mut self, id: &ActorId) -> Self {
        self.remotes.remove(id);
        self
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.remotes.contains_key(id)
    }

    pub fn ids(&self) -> BTreeSet<ActorId> {
        self.remotes.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn get(&self, id: &ActorId) -> Option<&Arc<dyn RemoteActor>> {
        self.remotes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ActorId, &Arc<dyn RemoteActor>)> {
        self.remotes.iter()
    }

    /// Quorum for exactly `ids`, reusing proxies from `previous` for members it already knows.
    pub(crate) fn rebuild(ids: &BTreeSet<ActorId>, previous: &PeerQuorum, factory: &dyn RemoteActorFactory) -> Self {
        let remotes = ids
            .iter()
            .map(|id| {
                let remote = match previous.get(id) {
                    Some(remote) => remote.clone(),
                    None => factory.create(id),
                };
                (*id, remote)
            })
            .collect();

        PeerQuorum { remotes }
    }
}

impl fmt::Debug for PeerQuorum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.remotes.keys()).finish()
    }
}
