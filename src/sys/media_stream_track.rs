use derive_more::Display;

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum TrackKind {
    #[display(fmt = "audio")]
    Audio,
    #[display(fmt = "video")]
    Video,
}

/// Handle to a local or remote media track owned by the primitive.
///
/// Two handles are equal when they refer to the same underlying track.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaStreamTrack {
    id: String,
    kind: TrackKind,
}

impl MediaStreamTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }
}

/// Group of tracks that a playback sink renders together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaStreamTrack>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<MediaStreamTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaStreamTrack] {
        &self.tracks
    }

    pub fn first_of_kind(&self, kind: TrackKind) -> Option<&MediaStreamTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }
}
