//! External collaborators: the WebRTC primitive, media tracks and the
//! signaling transport.

mod loopback;
mod media_stream_track;
mod rtc_peer_connection;
mod transport;
mod websocket;

pub use self::{
    loopback::{LoopbackFactory, LoopbackPeer, LoopbackSender},
    media_stream_track::{MediaStream, MediaStreamTrack, TrackKind},
    rtc_peer_connection::{
        DataChannelEvent, PeerEvent, PeerFactory, PeerOptions, Role,
        RtcPeerConnection, RtpSender,
    },
    transport::{MemoryServer, MemoryTransport, Transport},
    websocket::WebSocketTransport,
};
