use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use futures_signals::signal::{Mutable, Signal};

use crate::{
    config::MuteStrategy,
    error::TrackError,
    sys::{MediaStreamTrack, RtcPeerConnection, RtpSender},
};

/// Outbound track of the talker together with its mute toggle.
///
/// The original track is either attached to [`Sender::rtp_sender`] or
/// detached from it, never both.
pub struct Sender {
    strategy: MuteStrategy,
    track: MediaStreamTrack,
    rtp_sender: RefCell<Option<Rc<dyn RtpSender>>>,

    /// Mirrors the UI toggle; rolled back when a mutation fails.
    muted: Mutable<bool>,

    in_progress: Cell<bool>,
}

impl Sender {
    pub fn new(
        strategy: MuteStrategy,
        track: MediaStreamTrack,
        rtp_sender: Rc<dyn RtpSender>,
    ) -> Self {
        Self {
            strategy,
            track,
            rtp_sender: RefCell::new(Some(rtp_sender)),
            muted: Mutable::new(false),
            in_progress: Cell::new(false),
        }
    }

    pub fn strategy(&self) -> MuteStrategy {
        self.strategy
    }

    pub fn track(&self) -> &MediaStreamTrack {
        &self.track
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn muted_signal(&self) -> impl Signal<Item = bool> {
        self.muted.signal()
    }

    /// Whether the original track currently flows through a sender.
    pub fn is_attached(&self) -> bool {
        self.rtp_sender
            .borrow()
            .as_ref()
            .and_then(|s| s.track())
            .map_or(false, |t| t == self.track)
    }

    /// The toggle flips immediately and is restored to its previous value if
    /// the mutation fails.
    pub async fn set_muted(
        &self,
        conn: &dyn RtcPeerConnection,
        muted: bool,
    ) -> Result<(), TrackError> {
        if self.in_progress.get() {
            tracing::warn!(muted, "Skip mute toggle, previous one is pending");
            return Err(TrackError::InProgress);
        }
        let prior = self.muted.get();
        if prior == muted {
            return Ok(());
        }
        self.muted.set(muted);
        self.in_progress.set(true);
        tracing::info!(
            muted,
            strategy = ?self.strategy,
            track = self.track.id(),
            "Set outbound audio mute"
        );

        let res = match self.strategy {
            MuteStrategy::Replace => self.replace(muted).await,
            MuteStrategy::RemoveAdd => self.remove_add(conn, muted),
        };
        self.in_progress.set(false);

        match &res {
            Ok(()) => tracing::info!(muted, "Outbound audio mute applied"),
            Err(e @ TrackError::InvalidModification(_)) => {
                tracing::error!(error = %e, "Track mutation needs renegotiation");
                self.muted.set(prior);
            }
            Err(e) => {
                tracing::error!(error = %e, "Track mutation failed");
                self.muted.set(prior);
            }
        }
        res
    }

    async fn replace(&self, muted: bool) -> Result<(), TrackError> {
        let sender = self.rtp_sender.borrow().clone();
        let sender = sender.ok_or(TrackError::NoSender)?;
        let track = if muted { None } else { Some(self.track.clone()) };
        sender.replace_track(track).await
    }

    fn remove_add(
        &self,
        conn: &dyn RtcPeerConnection,
        muted: bool,
    ) -> Result<(), TrackError> {
        if muted {
            let sender = self.rtp_sender.borrow().clone();
            let sender = sender.ok_or(TrackError::NoSender)?;
            conn.remove_track(&sender)?;
            self.rtp_sender.replace(None);
        } else {
            let sender = conn.add_track(&self.track)?;
            self.rtp_sender.replace(Some(sender));
        }
        Ok(())
    }
}
