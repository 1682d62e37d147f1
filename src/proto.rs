//! Signaling messages exchanged with the media server.
//!
//! Every message is a JSON object discriminated by its `id` field.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Server-assigned identifier of a single remote WebRTC endpoint.
///
/// Correlates every signaling message with one local peer connection.
#[derive(
    Clone,
    Debug,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct EndpointId(pub String);

impl From<&str> for EndpointId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// ICE candidate as relayed between the primitive and the server.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages sent by this client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Start,

    Stop,

    Debug,

    #[serde(rename = "WEBRTCPEER_READY", rename_all = "camelCase")]
    WebRtcPeerReady { web_rtc_ep_id: EndpointId },

    #[serde(rename_all = "camelCase")]
    ProcessSdpAnswer {
        web_rtc_ep_id: EndpointId,
        sdp_answer: String,
    },

    #[serde(rename_all = "camelCase")]
    AddIceCandidate {
        web_rtc_ep_id: EndpointId,
        candidate: IceCandidate,
    },

    #[serde(rename_all = "camelCase")]
    ProcessSdpReoffer {
        web_rtc_ep_id: EndpointId,
        sdp_offer: String,
    },

    Error { message: String },
}

/// Messages received from the media server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    MakePeer {
        sdp_offer: String,
        web_rtc_ep_id: EndpointId,
    },

    #[serde(rename_all = "camelCase")]
    MakeTalker {
        sdp_offer: String,
        web_rtc_ep_id: EndpointId,
    },

    #[serde(rename_all = "camelCase")]
    MakeListener {
        sdp_offer: String,
        web_rtc_ep_id: EndpointId,
    },

    #[serde(rename_all = "camelCase")]
    AddIceCandidate {
        web_rtc_ep_id: EndpointId,
        candidate: IceCandidate,
    },

    #[serde(rename_all = "camelCase")]
    ProcessSdpReanswer {
        web_rtc_ep_id: EndpointId,
        sdp_answer: String,
    },

    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::MakePeer { .. } => MessageKind::MakePeer,
            Self::MakeTalker { .. } => MessageKind::MakeTalker,
            Self::MakeListener { .. } => MessageKind::MakeListener,
            Self::AddIceCandidate { .. } => MessageKind::AddIceCandidate,
            Self::ProcessSdpReanswer { .. } => {
                MessageKind::ProcessSdpReanswer
            }
            Self::Error { .. } => MessageKind::Error,
        }
    }
}

/// Discriminator of an inbound [`ServerMessage`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum MessageKind {
    #[display(fmt = "MAKE_PEER")]
    MakePeer,
    #[display(fmt = "MAKE_TALKER")]
    MakeTalker,
    #[display(fmt = "MAKE_LISTENER")]
    MakeListener,
    #[display(fmt = "ADD_ICE_CANDIDATE")]
    AddIceCandidate,
    #[display(fmt = "PROCESS_SDP_REANSWER")]
    ProcessSdpReanswer,
    #[display(fmt = "ERROR")]
    Error,
}

impl MessageKind {
    const ALL: [Self; 6] = [
        Self::MakePeer,
        Self::MakeTalker,
        Self::MakeListener,
        Self::AddIceCandidate,
        Self::ProcessSdpReanswer,
        Self::Error,
    ];

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.to_string() == id)
    }
}
