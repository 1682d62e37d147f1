mod media;
mod peer;
mod registry;
mod room;

pub use self::{
    media::{DataLog, PlaybackSlot, Receiver, Sender},
    peer::{NegotiationState, Peer, PeerKind},
    registry::PeerRegistry,
    room::Room,
};
