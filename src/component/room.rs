//! Session orchestrator.
//!
//! Owns everything a page used to keep in globals: the signaling channel,
//! the session state and the registry of peers.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures::{channel::mpsc, Stream, StreamExt as _};
use tokio::task::spawn_local;

use crate::{
    component::{Peer, PeerKind, PeerRegistry, PlaybackSlot},
    config::{MuteStrategy, ReanswerFailure, SessionConfig},
    error::{NegotiationError, TrackError},
    proto::{ClientMessage, EndpointId, IceCandidate, ServerMessage},
    router::{MessageRouter, Route},
    signaling::SignalingChannel,
    snapshot::{SessionSnapshot, SessionState},
    sys::{PeerEvent, PeerFactory, PeerOptions},
};

pub struct Room {
    config: SessionConfig,
    router: MessageRouter,
    channel: SignalingChannel,
    factory: Rc<dyn PeerFactory>,
    snapshot: SessionSnapshot,
    peers: PeerRegistry,

    /// Endpoint of the peer that drives the session (peer or talker).
    primary: RefCell<Option<EndpointId>>,

    /// Number of listeners created in the current session.
    listeners: Cell<usize>,
}

impl Room {
    pub fn new(
        config: SessionConfig,
        channel: SignalingChannel,
        factory: Rc<dyn PeerFactory>,
    ) -> Rc<Self> {
        Rc::new(Self {
            router: MessageRouter::new(config.variant),
            snapshot: SessionSnapshot::new(config.variant),
            config,
            channel,
            factory,
            peers: PeerRegistry::new(),
            primary: RefCell::new(None),
            listeners: Cell::new(0),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.state()
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn primary_peer(&self) -> Option<Rc<Peer>> {
        let primary = self.primary.borrow().clone()?;
        self.peers.get(&primary)
    }

    /// Spawns the listener of inbound signaling frames.
    ///
    /// Every frame is handled in its own task, so a peer that is still being
    /// created doesn't hold back candidates of the others.
    pub fn spawn_tasks<S>(self: Rc<Self>, mut inbound: S)
    where
        S: Stream<Item = String> + Unpin + 'static,
    {
        spawn_local(async move {
            while let Some(raw) = inbound.next().await {
                spawn_local(Rc::clone(&self).handle_raw(raw));
            }
            tracing::info!("Signaling channel closed by the server");
        });
    }

    pub async fn handle_raw(self: Rc<Self>, raw: String) {
        tracing::debug!(message = %raw, "Received message");
        match SignalingChannel::decode(&raw) {
            Ok(msg) => self.handle_message(msg).await,
            Err(e) => tracing::warn!(error = %e, "Invalid message"),
        }
    }

    pub async fn handle_message(self: Rc<Self>, msg: ServerMessage) {
        let route = match self.router.route(msg) {
            Some(route) => route,
            None => return,
        };
        match route {
            Route::MakePeer {
                kind,
                endpoint,
                sdp_offer,
            } => self.make_peer(kind, endpoint, sdp_offer).await,
            Route::AddIceCandidate {
                endpoint,
                candidate,
            } => self.add_ice_candidate(endpoint, candidate).await,
            Route::ProcessSdpReanswer {
                endpoint,
                sdp_answer,
            } => self.process_reanswer(endpoint, sdp_answer).await,
            Route::Error { message } => {
                tracing::error!(%message, "Server error");
                tracing::info!("Assume that the other side stops after an error");
                self.stop();
            }
        }
    }

    pub fn start(&self) {
        if !self.snapshot.begin() {
            tracing::warn!(state = ?self.state(), "Skip start, session isn't idle");
            return;
        }
        tracing::info!(variant = ?self.config.variant, "Start session");
        self.channel.send(&ClientMessage::Start);
    }

    /// Returns to [`SessionState::Idle`] and closes every peer.
    ///
    /// Doesn't wait for the server to acknowledge `STOP`.
    pub fn stop(&self) {
        if !self.snapshot.reset() {
            tracing::info!("Skip stop, already stopped");
            return;
        }
        for peer in self.peers.drain() {
            peer.close();
        }
        self.primary.replace(None);
        self.listeners.set(0);
        tracing::info!("Session stopped");
        self.channel.send(&ClientMessage::Stop);
    }

    pub fn debug(&self) {
        if !self.config.variant.debug_control() {
            tracing::warn!(variant = ?self.config.variant, "Skip debug, not supported");
            return;
        }
        if self.state() != SessionState::Started {
            tracing::warn!(state = ?self.state(), "Skip debug, session isn't started");
            return;
        }
        self.channel.send(&ClientMessage::Debug);
    }

    /// Sends `text` over the data channel of the primary peer.
    pub fn send_data(&self, text: &str) -> Result<(), NegotiationError> {
        if !self.config.variant.data_channels() {
            return Err(NegotiationError::DataChannel(
                "variant has no data channels".into(),
            ));
        }
        if self.state() != SessionState::Started {
            return Err(NegotiationError::DataChannel(
                "session isn't started".into(),
            ));
        }
        let peer = self.primary_peer().ok_or(NegotiationError::Closed)?;
        peer.send_data(text).map_err(|e| {
            tracing::error!(endpoint = %peer.endpoint(), error = %e, "Can't send data");
            e
        })
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), TrackError> {
        if !self.config.variant.muting() {
            return Err(TrackError::Unsupported);
        }
        if self.state() != SessionState::Started {
            return Err(TrackError::InvalidState(
                "session isn't started".into(),
            ));
        }
        let peer = self.primary_peer().ok_or(TrackError::NoSender)?;
        peer.set_muted(muted).await
    }

    pub fn close(&self) {
        self.channel.close();
    }

    /// Reports `message` to the server and stops the session.
    ///
    /// Failures of an already stopped session (an older `epoch`) are only
    /// logged.
    fn abort(&self, epoch: u64, message: String) {
        if self.snapshot.epoch() != epoch {
            tracing::debug!(%message, "Ignore failure of a stopped session");
            return;
        }
        tracing::error!(%message, "Abort session");
        self.channel.send(&ClientMessage::Error { message });
        self.stop();
    }

    fn next_slot(&self, kind: PeerKind) -> Option<PlaybackSlot> {
        match kind {
            PeerKind::Listener => {
                let n = self.listeners.get();
                self.listeners.set(n + 1);
                Some(PlaybackSlot::Listener(n))
            }
            _ if kind.role().receives() => Some(PlaybackSlot::Remote),
            _ => None,
        }
    }

    async fn make_peer(
        self: Rc<Self>,
        kind: PeerKind,
        endpoint: EndpointId,
        sdp_offer: String,
    ) {
        if self.state() == SessionState::Idle {
            tracing::warn!(%endpoint, %kind, "Skip, session is stopped");
            return;
        }
        if !self.peers.reserve(&endpoint) {
            tracing::warn!(%endpoint, %kind, "Skip, endpoint already has a peer");
            return;
        }
        let epoch = self.snapshot.epoch();
        let slot = self.next_slot(kind);
        tracing::info!(%endpoint, %kind, role = %kind.role(), "Make peer");

        let (events_tx, events_rx) = mpsc::unbounded();
        Rc::clone(&self).spawn_on_peer_event(endpoint.clone(), epoch, events_rx);

        let options = PeerOptions {
            role: kind.role(),
            media: self.config.media(),
            data_channels: self.config.variant.data_channels(),
            events: events_tx,
        };
        let conn = match self.factory.create(options).await {
            Ok(conn) => conn,
            Err(e) => {
                if self.snapshot.epoch() != epoch {
                    tracing::debug!(%endpoint, error = %e, "Ignore failure of a stopped session");
                    return;
                }
                self.peers.release(&endpoint);
                self.abort(
                    epoch,
                    format!("[{}] Error: {}", kind.error_context(), e),
                );
                return;
            }
        };
        if self.snapshot.epoch() != epoch {
            tracing::info!(%endpoint, "Discard peer created for a stopped session");
            conn.close();
            return;
        }

        let peer = Peer::new(endpoint.clone(), kind, conn, &self.config, slot);
        self.peers.insert(Rc::clone(&peer));
        if kind.is_primary() {
            self.primary.replace(Some(endpoint.clone()));
        }
        tracing::info!(%endpoint, %kind, "Peer created");

        self.channel.send(&ClientMessage::WebRtcPeerReady {
            web_rtc_ep_id: endpoint.clone(),
        });

        match peer.process_offer(&sdp_offer).await {
            Ok(sdp_answer) => {
                self.channel.send(&ClientMessage::ProcessSdpAnswer {
                    web_rtc_ep_id: endpoint.clone(),
                    sdp_answer,
                });
                tracing::info!(%endpoint, "SDP answer sent");
                if kind.is_primary() && self.snapshot.started() {
                    tracing::info!("Session started");
                }
            }
            Err(NegotiationError::Closed) => {
                tracing::debug!(%endpoint, "Discard answer of a closed peer");
            }
            Err(e) => self.abort(
                epoch,
                format!(
                    "[{}.processOffer] Error: {}",
                    kind.error_context(),
                    e
                ),
            ),
        }
    }

    /// Relays primitive events of the peer being created for `endpoint`.
    ///
    /// Ends when the primitive drops its event sink or the session that
    /// created it is stopped.
    fn spawn_on_peer_event(
        self: Rc<Self>,
        endpoint: EndpointId,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        spawn_local(async move {
            while let Some(event) = events.next().await {
                if self.snapshot.epoch() != epoch {
                    break;
                }
                self.on_peer_event(&endpoint, epoch, event).await;
            }
        });
    }

    async fn on_peer_event(
        &self,
        endpoint: &EndpointId,
        epoch: u64,
        event: PeerEvent,
    ) {
        match event {
            PeerEvent::IceCandidate(candidate) => {
                self.channel.send(&ClientMessage::AddIceCandidate {
                    web_rtc_ep_id: endpoint.clone(),
                    candidate,
                });
            }
            PeerEvent::NegotiationNeeded => {
                self.on_negotiation_needed(endpoint, epoch).await
            }
            PeerEvent::Track { track, streams } => {
                match self.peers.get(endpoint) {
                    Some(peer) => peer.on_remote_track(&track, &streams),
                    None => tracing::warn!(%endpoint, "Skip remote track, unknown endpoint"),
                }
            }
            PeerEvent::DataChannel(ev) => match self.peers.get(endpoint) {
                Some(peer) => peer.on_data_channel(ev),
                None => tracing::warn!(%endpoint, "Skip data channel event, unknown endpoint"),
            },
        }
    }

    /// Re-offers the talker's changed track set.
    ///
    /// Only a sending peer renegotiates, and only under
    /// [`MuteStrategy::RemoveAdd`].
    async fn on_negotiation_needed(&self, endpoint: &EndpointId, epoch: u64) {
        let renegotiates = self.config.variant.muting()
            && self.config.mute_strategy == MuteStrategy::RemoveAdd;
        let peer = match self.peers.get(endpoint) {
            Some(peer)
                if renegotiates
                    && peer.sender().is_some()
                    && peer.can_renegotiate() =>
            {
                peer
            }
            _ => {
                tracing::debug!(%endpoint, "Negotiation needed, NOOP");
                return;
            }
        };

        match peer.renegotiate().await {
            Ok(sdp_offer) => {
                self.channel.send(&ClientMessage::ProcessSdpReoffer {
                    web_rtc_ep_id: endpoint.clone(),
                    sdp_offer,
                });
                tracing::info!(%endpoint, "SDP re-offer sent");
            }
            Err(NegotiationError::Closed) => {
                tracing::debug!(%endpoint, "Discard re-offer of a closed peer");
            }
            Err(e) => self.abort(
                epoch,
                format!(
                    "[{}.generateOffer] Error: {}",
                    peer.kind().error_context(),
                    e
                ),
            ),
        }
    }

    async fn add_ice_candidate(
        &self,
        endpoint: EndpointId,
        candidate: IceCandidate,
    ) {
        match self.peers.get(&endpoint) {
            Some(peer) => peer.add_remote_candidate(candidate).await,
            None => {
                tracing::warn!(%endpoint, "Skip ICE candidate, unknown endpoint")
            }
        }
    }

    async fn process_reanswer(&self, endpoint: EndpointId, sdp_answer: String) {
        let epoch = self.snapshot.epoch();
        let peer = match self.peers.get(&endpoint) {
            Some(peer) => peer,
            None => {
                tracing::warn!(%endpoint, "Skip SDP re-answer, unknown endpoint");
                return;
            }
        };

        match peer.process_reanswer(&sdp_answer).await {
            Ok(()) => tracing::info!(%endpoint, "SDP re-answer applied"),
            Err(NegotiationError::Closed) => {
                tracing::debug!(%endpoint, "Discard re-answer of a closed peer");
            }
            Err(e) => match self.config.reanswer_failure {
                ReanswerFailure::Log => tracing::error!(
                    %endpoint,
                    error = %e,
                    "Can't apply SDP re-answer"
                ),
                ReanswerFailure::Abort => self.abort(
                    epoch,
                    format!(
                        "[{}.processAnswer] Error: {}",
                        peer.kind().error_context(),
                        e
                    ),
                ),
            },
        }
    }
}
