//! In-process stand-ins for the WebRTC primitive.
//!
//! They answer every offer locally, gather a configurable number of host
//! candidates and allow any operation to be failed on demand.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

use async_trait::async_trait;
use futures::channel::mpsc;
use tokio::time::sleep;

use crate::{
    error::{MediaError, NegotiationError, TrackError},
    proto::IceCandidate,
    sys::{
        DataChannelEvent, MediaStream, MediaStreamTrack, PeerEvent,
        PeerFactory, PeerOptions, Role, RtcPeerConnection, RtpSender,
        TrackKind,
    },
};

async fn delay(latency: Duration) {
    if !latency.is_zero() {
        sleep(latency).await;
    }
}

#[derive(Default)]
pub struct LoopbackFactory {
    latency: Duration,
    candidates: usize,
    next_id: Cell<u32>,
    failure: RefCell<Option<MediaError>>,
    offer_failure: RefCell<Option<String>>,
    peers: RefCell<Vec<Rc<LoopbackPeer>>>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of local candidates gathered while answering an offer.
    pub fn with_candidates(mut self, candidates: usize) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn fail_next(&self, err: MediaError) {
        *self.failure.borrow_mut() = Some(err);
    }

    /// Fails `process_offer` of the next created peer with `reason`.
    ///
    /// Like every injected failure, it's reported even if the connection is
    /// closed meanwhile.
    pub fn fail_next_offer(&self, reason: &str) {
        *self.offer_failure.borrow_mut() = Some(reason.to_owned());
    }

    /// Connections created by this factory.
    ///
    /// Closed ones are dropped on the next [`PeerFactory::create`] call.
    pub fn peers(&self) -> Vec<Rc<LoopbackPeer>> {
        self.peers.borrow().clone()
    }

    pub fn last_peer(&self) -> Option<Rc<LoopbackPeer>> {
        self.peers.borrow().last().cloned()
    }
}

#[async_trait(?Send)]
impl PeerFactory for LoopbackFactory {
    async fn create(
        &self,
        options: PeerOptions,
    ) -> Result<Rc<dyn RtcPeerConnection>, MediaError> {
        delay(self.latency).await;
        if let Some(err) = self.failure.borrow_mut().take() {
            return Err(err);
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let mut local_tracks = Vec::new();
        if options.role.sends() {
            if options.media.audio {
                local_tracks.push(MediaStreamTrack::new(
                    format!("loopback-{}-audio", id),
                    TrackKind::Audio,
                ));
            }
            if options.media.video {
                local_tracks.push(MediaStreamTrack::new(
                    format!("loopback-{}-video", id),
                    TrackKind::Video,
                ));
            }
        }
        let replace_failure = Rc::new(RefCell::new(None));
        let senders = local_tracks
            .iter()
            .map(|t| {
                Rc::new(LoopbackSender {
                    track: RefCell::new(Some(t.clone())),
                    latency: self.latency,
                    failure: Rc::clone(&replace_failure),
                })
            })
            .collect::<Vec<_>>();

        let peer = Rc::new(LoopbackPeer {
            id,
            role: options.role,
            data_channels: options.data_channels,
            latency: self.latency,
            candidates: self.candidates,
            events: options.events,
            local_tracks,
            senders: RefCell::new(senders),
            offers: Cell::new(0),
            local_description: RefCell::default(),
            remote_description: RefCell::default(),
            remote_candidates: RefCell::default(),
            sent_data: RefCell::default(),
            closed: Cell::new(false),
            offer_failure: RefCell::new(
                self.offer_failure.borrow_mut().take(),
            ),
            generate_failure: RefCell::default(),
            answer_failure: RefCell::default(),
            reject_candidates: Cell::new(false),
            track_failure: RefCell::default(),
            replace_failure,
        });
        let mut peers = self.peers.borrow_mut();
        peers.retain(|p| !p.is_closed());
        peers.push(Rc::clone(&peer));

        Ok(peer)
    }
}

pub struct LoopbackPeer {
    id: u32,
    role: Role,
    data_channels: bool,
    latency: Duration,
    candidates: usize,
    events: mpsc::UnboundedSender<PeerEvent>,
    local_tracks: Vec<MediaStreamTrack>,
    senders: RefCell<Vec<Rc<LoopbackSender>>>,
    offers: Cell<u32>,
    local_description: RefCell<Option<String>>,
    remote_description: RefCell<Option<String>>,
    remote_candidates: RefCell<Vec<IceCandidate>>,
    sent_data: RefCell<Vec<String>>,
    closed: Cell<bool>,
    offer_failure: RefCell<Option<String>>,
    generate_failure: RefCell<Option<String>>,
    answer_failure: RefCell<Option<String>>,
    reject_candidates: Cell<bool>,
    track_failure: RefCell<Option<TrackError>>,
    replace_failure: Rc<RefCell<Option<TrackError>>>,
}

impl LoopbackPeer {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn local_description(&self) -> Option<String> {
        self.local_description.borrow().clone()
    }

    pub fn remote_description(&self) -> Option<String> {
        self.remote_description.borrow().clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.borrow().clone()
    }

    pub fn sent_data(&self) -> Vec<String> {
        self.sent_data.borrow().clone()
    }

    /// Tracks currently carried by the senders of this connection.
    pub fn sent_tracks(&self) -> Vec<Option<MediaStreamTrack>> {
        self.senders.borrow().iter().map(|s| s.track()).collect()
    }

    pub fn fail_process_offer(&self, reason: &str) {
        *self.offer_failure.borrow_mut() = Some(reason.to_owned());
    }

    pub fn fail_generate_offer(&self, reason: &str) {
        *self.generate_failure.borrow_mut() = Some(reason.to_owned());
    }

    pub fn fail_process_answer(&self, reason: &str) {
        *self.answer_failure.borrow_mut() = Some(reason.to_owned());
    }

    pub fn reject_candidates(&self, reject: bool) {
        self.reject_candidates.set(reject);
    }

    /// Fails the next synchronous `add_track`/`remove_track`.
    pub fn fail_next_track_op(&self, err: TrackError) {
        *self.track_failure.borrow_mut() = Some(err);
    }

    /// Rejects the next `replace_track` of any sender.
    pub fn fail_next_replace(&self, err: TrackError) {
        *self.replace_failure.borrow_mut() = Some(err);
    }

    pub fn emit(&self, event: PeerEvent) {
        if self.events.unbounded_send(event).is_err() {
            tracing::debug!(peer = self.id, "Loopback event dropped");
        }
    }

    /// Simulates the remote side adding a track of `kind`.
    pub fn push_remote_track(&self, kind: TrackKind) -> MediaStream {
        let track =
            MediaStreamTrack::new(format!("remote-{}-{}", self.id, kind), kind);
        let stream =
            MediaStream::new(format!("remote-{}", self.id), vec![track.clone()]);
        self.emit(PeerEvent::Track {
            track,
            streams: vec![stream.clone()],
        });
        stream
    }

    pub fn push_data(&self, text: &str) {
        self.emit(PeerEvent::DataChannel(DataChannelEvent::Message(
            text.to_owned(),
        )));
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.closed.get() {
            Err(NegotiationError::Closed)
        } else {
            Ok(())
        }
    }

    fn describe(&self, kind: &str, version: u32) -> String {
        format!(
            "v=0\r\no=loopback {} {} IN IP4 127.0.0.1\r\ns={} {}\r\n",
            self.id, version, kind, self.role,
        )
    }

    fn gather_candidates(&self) {
        for i in 0..self.candidates {
            self.emit(PeerEvent::IceCandidate(IceCandidate {
                candidate: format!(
                    "candidate:{} 1 UDP 2122252543 127.0.0.1 {} typ host",
                    i,
                    50_000 + i,
                ),
                sdp_mid: Some("0".to_owned()),
                sdp_m_line_index: Some(0),
            }));
        }
    }
}

#[async_trait(?Send)]
impl RtcPeerConnection for LoopbackPeer {
    async fn process_offer(
        &self,
        sdp_offer: &str,
    ) -> Result<String, NegotiationError> {
        delay(self.latency).await;
        if let Some(reason) = self.offer_failure.borrow_mut().take() {
            return Err(NegotiationError::ProcessOffer(reason));
        }
        self.ensure_open()?;
        *self.remote_description.borrow_mut() = Some(sdp_offer.to_owned());
        let answer = self.describe("answer", 1);
        *self.local_description.borrow_mut() = Some(answer.clone());
        self.gather_candidates();

        Ok(answer)
    }

    async fn generate_offer(&self) -> Result<String, NegotiationError> {
        delay(self.latency).await;
        if let Some(reason) = self.generate_failure.borrow_mut().take() {
            return Err(NegotiationError::GenerateOffer(reason));
        }
        self.ensure_open()?;
        let version = self.offers.get() + 1;
        self.offers.set(version);
        let offer = self.describe("offer", version + 1);
        *self.local_description.borrow_mut() = Some(offer.clone());

        Ok(offer)
    }

    async fn process_answer(
        &self,
        sdp_answer: &str,
    ) -> Result<(), NegotiationError> {
        delay(self.latency).await;
        if let Some(reason) = self.answer_failure.borrow_mut().take() {
            return Err(NegotiationError::ProcessAnswer(reason));
        }
        self.ensure_open()?;
        *self.remote_description.borrow_mut() = Some(sdp_answer.to_owned());

        Ok(())
    }

    async fn add_ice_candidate(
        &self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if self.reject_candidates.get() {
            return Err(NegotiationError::AddIceCandidate(candidate.candidate));
        }
        self.remote_candidates.borrow_mut().push(candidate);

        Ok(())
    }

    fn local_tracks(&self) -> Vec<MediaStreamTrack> {
        self.local_tracks.clone()
    }

    fn local_stream(&self) -> Option<MediaStream> {
        if self.local_tracks.is_empty() {
            None
        } else {
            Some(MediaStream::new(
                format!("local-{}", self.id),
                self.local_tracks.clone(),
            ))
        }
    }

    fn senders(&self) -> Vec<Rc<dyn RtpSender>> {
        self.senders
            .borrow()
            .iter()
            .map(|s| Rc::clone(s) as Rc<dyn RtpSender>)
            .collect()
    }

    fn add_track(
        &self,
        track: &MediaStreamTrack,
    ) -> Result<Rc<dyn RtpSender>, TrackError> {
        if let Some(err) = self.track_failure.borrow_mut().take() {
            return Err(err);
        }
        if self.closed.get() {
            return Err(TrackError::InvalidState("connection closed".into()));
        }
        if !self.local_tracks.contains(track) {
            return Err(TrackError::InvalidState(format!(
                "unknown track {}",
                track.id(),
            )));
        }
        if self.sent_tracks().contains(&Some(track.clone())) {
            return Err(TrackError::InvalidState(format!(
                "track {} is already sent",
                track.id(),
            )));
        }
        let sender = Rc::new(LoopbackSender {
            track: RefCell::new(Some(track.clone())),
            latency: self.latency,
            failure: Rc::clone(&self.replace_failure),
        });
        self.senders.borrow_mut().push(Rc::clone(&sender));
        self.emit(PeerEvent::NegotiationNeeded);

        Ok(sender)
    }

    fn remove_track(
        &self,
        sender: &Rc<dyn RtpSender>,
    ) -> Result<(), TrackError> {
        if let Some(err) = self.track_failure.borrow_mut().take() {
            return Err(err);
        }
        if self.closed.get() {
            return Err(TrackError::InvalidState("connection closed".into()));
        }
        let target = Rc::as_ptr(sender) as *const ();
        let mut senders = self.senders.borrow_mut();
        let idx = senders
            .iter()
            .position(|s| Rc::as_ptr(s) as *const () == target)
            .ok_or_else(|| {
                TrackError::InvalidState("sender is not attached".into())
            })?;
        senders.remove(idx);
        drop(senders);
        self.emit(PeerEvent::NegotiationNeeded);

        Ok(())
    }

    fn send_data(&self, text: &str) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if !self.data_channels {
            return Err(NegotiationError::DataChannel(
                "no data channel negotiated".into(),
            ));
        }
        self.sent_data.borrow_mut().push(text.to_owned());

        Ok(())
    }

    fn close(&self) {
        if !self.closed.replace(true) {
            self.events.close_channel();
            tracing::debug!(peer = self.id, "Loopback peer closed");
        }
    }
}

pub struct LoopbackSender {
    track: RefCell<Option<MediaStreamTrack>>,
    latency: Duration,
    failure: Rc<RefCell<Option<TrackError>>>,
}

#[async_trait(?Send)]
impl RtpSender for LoopbackSender {
    fn track(&self) -> Option<MediaStreamTrack> {
        self.track.borrow().clone()
    }

    async fn replace_track(
        &self,
        track: Option<MediaStreamTrack>,
    ) -> Result<(), TrackError> {
        delay(self.latency).await;
        if let Some(err) = self.failure.borrow_mut().take() {
            return Err(err);
        }
        *self.track.borrow_mut() = track;

        Ok(())
    }
}
