//! Seam to the WebRTC negotiation primitive.
//!
//! SDP generation/application and ICE gathering live behind these traits;
//! the signaling core only drives them.

use std::rc::Rc;

use async_trait::async_trait;
use derive_more::Display;
use futures::channel::mpsc;

use crate::{
    config::MediaConstraints,
    error::{MediaError, NegotiationError, TrackError},
    proto::IceCandidate,
    sys::{MediaStream, MediaStreamTrack},
};

/// Media direction of a peer connection.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Role {
    #[display(fmt = "send-receive")]
    SendRecv,
    #[display(fmt = "send-only")]
    SendOnly,
    #[display(fmt = "receive-only")]
    RecvOnly,
}

impl Role {
    pub fn sends(self) -> bool {
        matches!(self, Self::SendRecv | Self::SendOnly)
    }

    pub fn receives(self) -> bool {
        matches!(self, Self::SendRecv | Self::RecvOnly)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DataChannelEvent {
    Open,
    Close,
    Message(String),
    Error(String),
}

/// Events raised by the primitive after creation.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerEvent {
    IceCandidate(IceCandidate),

    /// Track set changed and a new offer/answer round is required.
    NegotiationNeeded,

    Track {
        track: MediaStreamTrack,
        streams: Vec<MediaStream>,
    },

    DataChannel(DataChannelEvent),
}

/// Everything the primitive needs to be created.
pub struct PeerOptions {
    pub role: Role,
    pub media: MediaConstraints,
    pub data_channels: bool,

    /// Sink for [`PeerEvent`]s. Dropped together with the primitive.
    pub events: mpsc::UnboundedSender<PeerEvent>,
}

/// Creates negotiation primitives, acquiring local media if the role sends.
#[async_trait(?Send)]
pub trait PeerFactory {
    async fn create(
        &self,
        options: PeerOptions,
    ) -> Result<Rc<dyn RtcPeerConnection>, MediaError>;
}

#[async_trait(?Send)]
pub trait RtcPeerConnection {
    async fn process_offer(
        &self,
        sdp_offer: &str,
    ) -> Result<String, NegotiationError>;

    /// Creates and applies a new local offer.
    async fn generate_offer(&self) -> Result<String, NegotiationError>;

    async fn process_answer(
        &self,
        sdp_answer: &str,
    ) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError>;

    fn local_tracks(&self) -> Vec<MediaStreamTrack>;

    /// Local stream the captured tracks belong to, if any.
    fn local_stream(&self) -> Option<MediaStream>;

    fn senders(&self) -> Vec<Rc<dyn RtpSender>>;

    /// Attaches `track` through a new sender. Raises `NegotiationNeeded`.
    fn add_track(
        &self,
        track: &MediaStreamTrack,
    ) -> Result<Rc<dyn RtpSender>, TrackError>;

    /// Detaches `sender` from the connection. Raises `NegotiationNeeded`.
    fn remove_track(&self, sender: &Rc<dyn RtpSender>)
        -> Result<(), TrackError>;

    fn send_data(&self, text: &str) -> Result<(), NegotiationError>;

    fn close(&self);
}

#[async_trait(?Send)]
pub trait RtpSender {
    fn track(&self) -> Option<MediaStreamTrack>;

    /// Swaps the sent track without renegotiation.
    async fn replace_track(
        &self,
        track: Option<MediaStreamTrack>,
    ) -> Result<(), TrackError>;
}
