//! Dispatch of decoded [`ServerMessage`]s.

use crate::{
    component::PeerKind,
    config::Variant,
    proto::{EndpointId, IceCandidate, MessageKind, ServerMessage},
};

/// Handler-level view of an accepted inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Route {
    MakePeer {
        kind: PeerKind,
        endpoint: EndpointId,
        sdp_offer: String,
    },
    AddIceCandidate {
        endpoint: EndpointId,
        candidate: IceCandidate,
    },
    ProcessSdpReanswer {
        endpoint: EndpointId,
        sdp_answer: String,
    },
    Error {
        message: String,
    },
}

pub struct MessageRouter {
    variant: Variant,
}

impl MessageRouter {
    pub fn new(variant: Variant) -> Self {
        Self { variant }
    }

    pub fn accepts(&self, kind: MessageKind) -> bool {
        self.variant.accepted_kinds().contains(&kind)
    }

    /// Maps `msg` to its [`Route`], or drops it if this variant doesn't
    /// handle its kind.
    pub fn route(&self, msg: ServerMessage) -> Option<Route> {
        let kind = msg.kind();
        if !self.accepts(kind) {
            tracing::warn!(
                %kind,
                variant = ?self.variant,
                "Unrecognized message"
            );
            return None;
        }
        tracing::debug!(%kind, "Route message");

        Some(match msg {
            ServerMessage::MakePeer {
                sdp_offer,
                web_rtc_ep_id,
            } => Route::MakePeer {
                kind: PeerKind::Peer,
                endpoint: web_rtc_ep_id,
                sdp_offer,
            },
            ServerMessage::MakeTalker {
                sdp_offer,
                web_rtc_ep_id,
            } => Route::MakePeer {
                kind: PeerKind::Talker,
                endpoint: web_rtc_ep_id,
                sdp_offer,
            },
            ServerMessage::MakeListener {
                sdp_offer,
                web_rtc_ep_id,
            } => Route::MakePeer {
                kind: PeerKind::Listener,
                endpoint: web_rtc_ep_id,
                sdp_offer,
            },
            ServerMessage::AddIceCandidate {
                web_rtc_ep_id,
                candidate,
            } => Route::AddIceCandidate {
                endpoint: web_rtc_ep_id,
                candidate,
            },
            ServerMessage::ProcessSdpReanswer {
                web_rtc_ep_id,
                sdp_answer,
            } => Route::ProcessSdpReanswer {
                endpoint: web_rtc_ep_id,
                sdp_answer,
            },
            ServerMessage::Error { message } => Route::Error { message },
        })
    }
}
