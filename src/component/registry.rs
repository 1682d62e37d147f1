use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{component::Peer, proto::EndpointId};

/// Active peers by [`EndpointId`].
///
/// An endpoint is first reserved while its primitive is being created and
/// registered once creation succeeds, so there is at most one controller per
/// endpoint at any time. Entries are only removed explicitly.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RefCell<HashMap<EndpointId, Rc<Peer>>>,
    pending: RefCell<HashSet<EndpointId>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `id` is already registered or being created.
    pub fn reserve(&self, id: &EndpointId) -> bool {
        if self.peers.borrow().contains_key(id) {
            return false;
        }
        self.pending.borrow_mut().insert(id.clone())
    }

    pub fn release(&self, id: &EndpointId) {
        self.pending.borrow_mut().remove(id);
    }

    pub fn is_pending(&self, id: &EndpointId) -> bool {
        self.pending.borrow().contains(id)
    }

    /// Registers `peer`, returning the controller it displaced, if any.
    pub fn insert(&self, peer: Rc<Peer>) -> Option<Rc<Peer>> {
        let id = peer.endpoint().clone();
        self.pending.borrow_mut().remove(&id);
        self.peers.borrow_mut().insert(id, peer)
    }

    pub fn get(&self, id: &EndpointId) -> Option<Rc<Peer>> {
        self.peers.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.peers.borrow().contains_key(id)
    }

    pub fn remove(&self, id: &EndpointId) -> Option<Rc<Peer>> {
        self.peers.borrow_mut().remove(id)
    }

    pub fn len(&self) -> usize {
        self.peers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.borrow().is_empty()
    }

    pub fn ids(&self) -> Vec<EndpointId> {
        let mut ids: Vec<_> = self.peers.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Removes every peer and reservation.
    pub fn drain(&self) -> Vec<Rc<Peer>> {
        self.pending.borrow_mut().clear();
        self.peers.borrow_mut().drain().map(|(_, p)| p).collect()
    }
}
