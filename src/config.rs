//! Session configuration.
//!
//! Loaded once when the session is set up; precedence is env vars >
//! `signaling.toml` > defaults.

use serde::Deserialize;

use crate::proto::MessageKind;

/// Page flavour the session drives.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// One send-receive peer created by `MAKE_PEER`.
    Composite,

    /// Send-only talker plus receive-only listeners, with data channels.
    SfuDataChannels,

    /// Send-only talker plus receive-only listeners, with muting.
    SfuMute,
}

impl Variant {
    /// Inbound message kinds this variant handles.
    pub fn accepted_kinds(self) -> &'static [MessageKind] {
        use MessageKind as K;
        match self {
            Self::Composite => &[K::MakePeer, K::AddIceCandidate, K::Error],
            Self::SfuDataChannels => &[
                K::MakeTalker,
                K::MakeListener,
                K::AddIceCandidate,
                K::Error,
            ],
            Self::SfuMute => &[
                K::MakeTalker,
                K::MakeListener,
                K::AddIceCandidate,
                K::ProcessSdpReanswer,
                K::Error,
            ],
        }
    }

    pub fn data_channels(self) -> bool {
        matches!(self, Self::Composite | Self::SfuDataChannels)
    }

    pub fn muting(self) -> bool {
        self == Self::SfuMute
    }

    pub fn debug_control(self) -> bool {
        self == Self::Composite
    }

    pub fn default_media(self) -> MediaConstraints {
        match self {
            Self::Composite => MediaConstraints {
                audio: true,
                video: true,
            },
            Self::SfuDataChannels | Self::SfuMute => MediaConstraints {
                audio: true,
                video: false,
            },
        }
    }
}

/// How the talker's outbound audio is muted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum MuteStrategy {
    /// `replaceTrack(null)` / `replaceTrack(track)` on the existing sender.
    #[default]
    Replace,

    /// Remove the sender and re-add the track, renegotiating each time.
    RemoveAdd,
}

/// Reaction to a `PROCESS_SDP_REANSWER` that can't be applied.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ReanswerFailure {
    /// Log and keep the session running.
    #[default]
    Log,

    /// Send `ERROR` and stop the session.
    Abort,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

fn default_data_log_limit() -> usize {
    64 * 1024
}

#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    pub variant: Variant,

    #[serde(default)]
    pub mute_strategy: MuteStrategy,

    #[serde(default)]
    pub reanswer_failure: ReanswerFailure,

    /// Bytes of received data-channel text retained per peer.
    #[serde(default = "default_data_log_limit")]
    pub data_log_limit: usize,

    /// Overrides [`Variant::default_media`].
    #[serde(default)]
    pub media: Option<MediaConstraints>,

    /// `ws://` or `wss://` signaling server; the demo runs against an
    /// in-process server when absent.
    #[serde(default)]
    pub server_url: Option<String>,
}

impl SessionConfig {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            mute_strategy: MuteStrategy::default(),
            reanswer_failure: ReanswerFailure::default(),
            data_log_limit: default_data_log_limit(),
            media: None,
            server_url: None,
        }
    }

    pub fn composite() -> Self {
        Self::new(Variant::Composite)
    }

    pub fn sfu_data_channels() -> Self {
        Self::new(Variant::SfuDataChannels)
    }

    pub fn sfu_mute(strategy: MuteStrategy) -> Self {
        Self {
            mute_strategy: strategy,
            ..Self::new(Variant::SfuMute)
        }
    }

    pub fn with_reanswer_failure(mut self, policy: ReanswerFailure) -> Self {
        self.reanswer_failure = policy;
        self
    }

    pub fn with_data_log_limit(mut self, limit: usize) -> Self {
        self.data_log_limit = limit;
        self
    }

    pub fn media(&self) -> MediaConstraints {
        self.media.unwrap_or_else(|| self.variant.default_media())
    }

    /// Layers defaults, an optional `signaling.toml` and `SIGNALING__*`
    /// environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("variant", "sfu-mute")?
            .set_default("mute_strategy", "replace")?
            .set_default("reanswer_failure", "log")?
            .set_default("data_log_limit", default_data_log_limit() as i64)?
            .add_source(config::File::with_name("signaling").required(false))
            .add_source(
                config::Environment::with_prefix("SIGNALING")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
