use derive_more::Display;
use futures_signals::signal::{Mutable, Signal};

use crate::sys::{MediaStream, MediaStreamTrack, TrackKind};

/// Local sink remote media is rendered into.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum PlaybackSlot {
    #[display(fmt = "remote")]
    Remote,
    #[display(fmt = "listener-{}", _0)]
    Listener(usize),
}

/// Binds remote media of a receiving peer to its [`PlaybackSlot`].
pub struct Receiver {
    slot: PlaybackSlot,
    kind: TrackKind,
    stream: Mutable<Option<MediaStream>>,
}

impl Receiver {
    pub fn new(slot: PlaybackSlot, kind: TrackKind) -> Self {
        Self {
            slot,
            kind,
            stream: Mutable::new(None),
        }
    }

    pub fn slot(&self) -> PlaybackSlot {
        self.slot
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn stream(&self) -> Option<MediaStream> {
        self.stream.get_cloned()
    }

    pub fn stream_signal(&self) -> impl Signal<Item = Option<MediaStream>> {
        self.stream.signal_cloned()
    }

    /// Plays the first stream of `track` if it has the expected kind.
    pub fn bind(
        &self,
        track: &MediaStreamTrack,
        streams: &[MediaStream],
    ) -> bool {
        if track.kind() != self.kind {
            tracing::debug!(
                slot = %self.slot,
                kind = %track.kind(),
                "Ignore remote track"
            );
            return false;
        }
        match streams.first() {
            Some(stream) => {
                tracing::info!(
                    slot = %self.slot,
                    stream = stream.id(),
                    "Set incoming stream"
                );
                self.stream.set(Some(stream.clone()));
                true
            }
            None => {
                tracing::warn!(
                    slot = %self.slot,
                    track = track.id(),
                    "Remote track has no stream"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_only_matching_kind() {
        let receiver = Receiver::new(PlaybackSlot::Listener(0), TrackKind::Audio);
        let video = MediaStreamTrack::new("v", TrackKind::Video);
        let audio = MediaStreamTrack::new("a", TrackKind::Audio);
        let stream = MediaStream::new("s", vec![video.clone(), audio.clone()]);

        assert!(!receiver.bind(&video, &[stream.clone()]));
        assert_eq!(receiver.stream(), None);

        assert!(receiver.bind(&audio, &[stream.clone()]));
        assert_eq!(receiver.stream(), Some(stream));
    }

    #[test]
    fn track_without_stream_is_not_bound() {
        let receiver = Receiver::new(PlaybackSlot::Remote, TrackKind::Video);
        let video = MediaStreamTrack::new("v", TrackKind::Video);

        assert!(!receiver.bind(&video, &[]));
        assert_eq!(receiver.stream(), None);
    }
}
