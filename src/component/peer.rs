//! Negotiation lifecycle of a single peer connection.

use std::{cell::RefCell, rc::Rc};

use derive_more::Display;
use futures_signals::signal::{Mutable, Signal};

use crate::{
    component::{DataLog, PlaybackSlot, Receiver, Sender},
    config::SessionConfig,
    error::{NegotiationError, TrackError},
    proto::{EndpointId, IceCandidate},
    sys::{
        DataChannelEvent, MediaStream, MediaStreamTrack, Role,
        RtcPeerConnection, TrackKind,
    },
};

/// What the server asked this peer to be.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PeerKind {
    /// Send-receive peer of the composite page.
    #[display(fmt = "peer")]
    Peer,
    #[display(fmt = "talker")]
    Talker,
    #[display(fmt = "listener")]
    Listener,
}

impl PeerKind {
    pub fn role(self) -> Role {
        match self {
            Self::Peer => Role::SendRecv,
            Self::Talker => Role::SendOnly,
            Self::Listener => Role::RecvOnly,
        }
    }

    /// Primary peers drive the session state, listeners don't.
    pub fn is_primary(self) -> bool {
        self != Self::Listener
    }

    /// Prefix of the `ERROR` messages reported for this peer.
    pub fn error_context(self) -> &'static str {
        match self {
            Self::Peer => "WebRtcPeer",
            Self::Talker => "talker.WebRtcPeer",
            Self::Listener => "listener.WebRtcPeer",
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum NegotiationState {
    /// Remote offer is being applied.
    AwaitingAnswer,
    /// Local answer produced.
    Negotiated,
    /// Local re-offer sent, re-answer not applied yet.
    Renegotiating,
    Closed,
}

pub struct Peer {
    endpoint: EndpointId,
    kind: PeerKind,
    conn: Rc<dyn RtcPeerConnection>,
    state: Mutable<NegotiationState>,
    local_stream: Option<MediaStream>,
    sender: Option<Sender>,
    receiver: Option<Receiver>,
    data_log: Option<RefCell<DataLog>>,
}

impl Peer {
    pub fn new(
        endpoint: EndpointId,
        kind: PeerKind,
        conn: Rc<dyn RtcPeerConnection>,
        config: &SessionConfig,
        slot: Option<PlaybackSlot>,
    ) -> Rc<Self> {
        let sender = if config.variant.muting() && kind.role().sends() {
            Self::find_audio_sender(&*conn, config)
        } else {
            None
        };
        let receiver = slot.filter(|_| kind.role().receives()).map(|slot| {
            let remote_kind = match slot {
                PlaybackSlot::Remote if config.media().video => {
                    TrackKind::Video
                }
                _ => TrackKind::Audio,
            };
            Receiver::new(slot, remote_kind)
        });
        let data_log = if config.variant.data_channels() {
            Some(RefCell::new(DataLog::new(config.data_log_limit)))
        } else {
            None
        };

        Rc::new(Self {
            endpoint,
            kind,
            local_stream: conn.local_stream(),
            conn,
            state: Mutable::new(NegotiationState::AwaitingAnswer),
            sender,
            receiver,
            data_log,
        })
    }

    fn find_audio_sender(
        conn: &dyn RtcPeerConnection,
        config: &SessionConfig,
    ) -> Option<Sender> {
        let track = conn
            .local_tracks()
            .into_iter()
            .find(|t| t.kind() == TrackKind::Audio)?;
        let rtp_sender = conn
            .senders()
            .into_iter()
            .find(|s| s.track().as_ref() == Some(&track));
        match rtp_sender {
            Some(rtp_sender) => {
                Some(Sender::new(config.mute_strategy, track, rtp_sender))
            }
            None => {
                tracing::warn!(track = track.id(), "No sender for local audio");
                None
            }
        }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn kind(&self) -> PeerKind {
        self.kind
    }

    pub fn state(&self) -> NegotiationState {
        self.state.get()
    }

    pub fn state_signal(&self) -> impl Signal<Item = NegotiationState> {
        self.state.signal()
    }

    pub fn is_closed(&self) -> bool {
        self.state.get() == NegotiationState::Closed
    }

    pub fn local_stream(&self) -> Option<&MediaStream> {
        self.local_stream.as_ref()
    }

    pub fn sender(&self) -> Option<&Sender> {
        self.sender.as_ref()
    }

    pub fn receiver(&self) -> Option<&Receiver> {
        self.receiver.as_ref()
    }

    /// Received data-channel text, `None` without data channels.
    pub fn data_text(&self) -> Option<String> {
        self.data_log.as_ref().map(|log| log.borrow().text())
    }

    pub async fn process_offer(
        &self,
        sdp_offer: &str,
    ) -> Result<String, NegotiationError> {
        tracing::debug!(endpoint = %self.endpoint, "Process SDP offer");
        let answer = self.settle(self.conn.process_offer(sdp_offer).await)?;
        self.state.set(NegotiationState::Negotiated);
        Ok(answer)
    }

    /// Forwards a remote candidate; rejections are only logged.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) {
        if self.is_closed() {
            tracing::warn!(
                endpoint = %self.endpoint,
                "Skip ICE candidate, peer is closed"
            );
            return;
        }
        if let Err(e) = self.conn.add_ice_candidate(candidate).await {
            tracing::error!(
                endpoint = %self.endpoint,
                error = %e,
                "Can't add ICE candidate"
            );
        }
    }

    /// Whether a renegotiation-needed event should produce a re-offer.
    ///
    /// Before the first answer is sent the event is ignored.
    pub fn can_renegotiate(&self) -> bool {
        matches!(
            self.state.get(),
            NegotiationState::Negotiated | NegotiationState::Renegotiating
        )
    }

    pub async fn renegotiate(&self) -> Result<String, NegotiationError> {
        tracing::debug!(endpoint = %self.endpoint, "Generate SDP re-offer");
        let offer = self.settle(self.conn.generate_offer().await)?;
        self.state.set(NegotiationState::Renegotiating);
        Ok(offer)
    }

    /// Applies the server's answer to the last re-offer.
    ///
    /// On failure the peer stays [`NegotiationState::Renegotiating`].
    pub async fn process_reanswer(
        &self,
        sdp_answer: &str,
    ) -> Result<(), NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError::Closed);
        }
        self.settle(self.conn.process_answer(sdp_answer).await)?;
        self.state.set(NegotiationState::Negotiated);
        Ok(())
    }

    /// Outcome of a primitive call that may have raced with [`Peer::close`].
    ///
    /// Once the peer is closed any result, including a primitive error, is
    /// [`NegotiationError::Closed`].
    fn settle<T>(
        &self,
        res: Result<T, NegotiationError>,
    ) -> Result<T, NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError::Closed);
        }
        res
    }

    pub fn on_remote_track(
        &self,
        track: &MediaStreamTrack,
        streams: &[MediaStream],
    ) {
        match &self.receiver {
            Some(receiver) => {
                receiver.bind(track, streams);
            }
            None => tracing::debug!(
                endpoint = %self.endpoint,
                kind = %track.kind(),
                "Ignore remote track on non-receiving peer"
            ),
        }
    }

    pub fn on_data_channel(&self, event: DataChannelEvent) {
        match event {
            DataChannelEvent::Open => {
                tracing::debug!(endpoint = %self.endpoint, "Data channel open")
            }
            DataChannelEvent::Close => {
                tracing::debug!(endpoint = %self.endpoint, "Data channel closed")
            }
            DataChannelEvent::Error(e) => tracing::warn!(
                endpoint = %self.endpoint,
                error = %e,
                "Data channel error"
            ),
            DataChannelEvent::Message(text) => {
                tracing::info!(
                    endpoint = %self.endpoint,
                    message = %text,
                    "Data channel message"
                );
                match &self.data_log {
                    Some(log) => log.borrow_mut().push(&text),
                    None => tracing::warn!(
                        endpoint = %self.endpoint,
                        "Data channel message without data log"
                    ),
                }
            }
        }
    }

    pub fn send_data(&self, text: &str) -> Result<(), NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError::Closed);
        }
        self.conn.send_data(text)
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), TrackError> {
        let sender = self.sender.as_ref().ok_or(TrackError::NoSender)?;
        sender.set_muted(&*self.conn, muted).await
    }

    pub fn close(&self) {
        if self.state.replace(NegotiationState::Closed)
            != NegotiationState::Closed
        {
            tracing::info!(endpoint = %self.endpoint, "Close peer");
            self.conn.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc;
    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::{MuteStrategy, Variant},
        sys::{LoopbackFactory, PeerFactory as _, PeerOptions},
    };

    async fn make(
        kind: PeerKind,
        config: &SessionConfig,
        slot: Option<PlaybackSlot>,
    ) -> Rc<Peer> {
        make_with(&LoopbackFactory::new(), kind, config, slot).await
    }

    async fn make_with(
        factory: &LoopbackFactory,
        kind: PeerKind,
        config: &SessionConfig,
        slot: Option<PlaybackSlot>,
    ) -> Rc<Peer> {
        let (events, _rx) = mpsc::unbounded();
        let conn = factory
            .create(PeerOptions {
                role: kind.role(),
                media: config.media(),
                data_channels: config.variant.data_channels(),
                events,
            })
            .await
            .unwrap();
        Peer::new("ep-1".into(), kind, conn, config, slot)
    }

    #[tokio::test]
    async fn renegotiation_waits_for_first_answer() {
        let config = SessionConfig::sfu_mute(MuteStrategy::RemoveAdd);
        let peer = make(PeerKind::Talker, &config, None).await;

        assert_eq!(peer.state(), NegotiationState::AwaitingAnswer);
        assert!(!peer.can_renegotiate());

        peer.process_offer("v=0").await.unwrap();
        assert!(peer.can_renegotiate());

        peer.renegotiate().await.unwrap();
        assert_eq!(peer.state(), NegotiationState::Renegotiating);
        peer.process_reanswer("v=0").await.unwrap();
        assert_eq!(peer.state(), NegotiationState::Negotiated);
    }

    #[tokio::test]
    async fn components_follow_kind_and_variant() {
        let mute = SessionConfig::sfu_mute(MuteStrategy::Replace);
        let talker = make(PeerKind::Talker, &mute, None).await;
        assert!(talker.sender().is_some());
        assert!(talker.receiver().is_none());
        assert!(talker.local_stream().is_some());
        assert_eq!(talker.data_text(), None);

        let data = SessionConfig::new(Variant::SfuDataChannels);
        let listener =
            make(PeerKind::Listener, &data, Some(PlaybackSlot::Listener(0)))
                .await;
        assert!(listener.sender().is_none());
        assert_eq!(
            listener.receiver().map(Receiver::kind),
            Some(TrackKind::Audio),
        );
        assert_eq!(listener.data_text(), Some(String::new()));

        let composite = SessionConfig::composite();
        let peer =
            make(PeerKind::Peer, &composite, Some(PlaybackSlot::Remote)).await;
        assert_eq!(peer.receiver().map(Receiver::kind), Some(TrackKind::Video));
    }

    #[tokio::test]
    async fn closed_peer_rejects_operations() {
        let config = SessionConfig::new(Variant::SfuDataChannels);
        let peer = make(PeerKind::Talker, &config, None).await;
        peer.close();

        assert!(peer.is_closed());
        assert_eq!(
            peer.process_offer("v=0").await,
            Err(NegotiationError::Closed),
        );
        assert_eq!(peer.send_data("hi"), Err(NegotiationError::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn primitive_failure_racing_close_is_reported_as_closed() {
        let config = SessionConfig::sfu_mute(MuteStrategy::RemoveAdd);
        let factory =
            LoopbackFactory::new().with_latency(Duration::from_millis(10));
        let peer = make_with(&factory, PeerKind::Talker, &config, None).await;
        peer.process_offer("v=0").await.unwrap();
        let conn = factory.last_peer().unwrap();

        conn.fail_generate_offer("InvalidStateError: connection closed");
        let (res, ()) = tokio::join!(peer.renegotiate(), async {
            sleep(Duration::from_millis(1)).await;
            peer.close();
        });

        assert_eq!(res, Err(NegotiationError::Closed));
        assert_eq!(peer.state(), NegotiationState::Closed);
    }

    #[test]
    fn error_context_names_the_peer() {
        assert_eq!(PeerKind::Peer.error_context(), "WebRtcPeer");
        assert_eq!(PeerKind::Listener.error_context(), "listener.WebRtcPeer");
        assert!(PeerKind::Talker.is_primary());
        assert!(!PeerKind::Listener.is_primary());
    }
}
