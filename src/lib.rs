//! Client side of the SFU demo signaling: negotiates one or more WebRTC
//! peers with the media server over a JSON message channel.

pub mod component;
pub mod config;
pub mod error;
pub mod proto;
pub mod router;
pub mod signaling;
pub mod snapshot;
pub mod sys;

pub use self::{
    component::Room,
    config::{MuteStrategy, ReanswerFailure, SessionConfig, Variant},
    signaling::SignalingChannel,
    snapshot::SessionState,
};
