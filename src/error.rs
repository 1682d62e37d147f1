//! Error types of the signaling client.
//!
//! Every error is handled at the boundary where it occurs: media and
//! negotiation failures abort the session, candidate and track errors are
//! only logged, and nothing is retried.

use thiserror::Error;

/// Cause of a failed media acquisition, classified by the DOM error name
/// reported by the peer-connection primitive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MediaErrorKind {
    /// No capture device for the requested tracks.
    NotFound,

    NotReadable,

    /// Device can't satisfy the requested constraints.
    Overconstrained,

    NotAllowed,

    /// Constraints requested no tracks at all.
    NoTracksRequested,

    Unknown,
}

impl MediaErrorKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "NotFoundError" | "DevicesNotFoundError" => Self::NotFound,
            "NotReadableError" | "TrackStartError" => Self::NotReadable,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                Self::Overconstrained
            }
            "NotAllowedError" | "PermissionDeniedError" => Self::NotAllowed,
            "TypeError" => Self::NoTracksRequested,
            _ => Self::Unknown,
        }
    }

    /// Human-readable explanation sent to the server in `ERROR`.
    pub fn explain(self) -> &'static str {
        match self {
            Self::NotFound => "Missing webcam for required tracks",
            Self::NotReadable => "Webcam is already in use",
            Self::Overconstrained => "Webcam doesn't provide required tracks",
            Self::NotAllowed => "Webcam permission has been denied by the user",
            Self::NoTracksRequested => "No media tracks have been requested",
            Self::Unknown => "Unknown error",
        }
    }
}

/// Peer-connection primitive couldn't be created.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{}: {detail}", .kind.explain())]
pub struct MediaError {
    pub kind: MediaErrorKind,
    pub detail: String,
}

impl MediaError {
    pub fn new(name: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: MediaErrorKind::from_name(name),
            detail: detail.into(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum NegotiationError {
    #[error("failed to process SDP offer: {0}")]
    ProcessOffer(String),

    #[error("failed to generate SDP offer: {0}")]
    GenerateOffer(String),

    #[error("failed to process SDP answer: {0}")]
    ProcessAnswer(String),

    #[error("ICE candidate rejected: {0}")]
    AddIceCandidate(String),

    #[error("data channel send failed: {0}")]
    DataChannel(String),

    #[error("peer connection is closed")]
    Closed,
}

/// Failure of a mute/unmute track mutation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrackError {
    /// Sender can't take the track without a full renegotiation.
    #[error("renegotiation needed: {0}")]
    InvalidModification(String),

    #[error("invalid sender or track state: {0}")]
    InvalidState(String),

    #[error("track operation rejected: {0}")]
    Rejected(String),

    #[error("no local sender to mute")]
    NoSender,

    #[error("another mute toggle is in progress")]
    InProgress,

    #[error("muting is not supported by the session variant")]
    Unsupported,
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("signaling channel is closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed signaling message: {0}")]
    Malformed(String),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
