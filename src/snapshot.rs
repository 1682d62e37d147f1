//! Observable session state.
//!
//! The UI layer subscribes to [`SessionSnapshot::signal`] or
//! [`SessionSnapshot::controls_signal`] and enables/disables its controls on
//! every discrete change.

use std::cell::Cell;

use futures_signals::signal::{Mutable, Signal};

use crate::config::Variant;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Starting,
    Started,
}

/// Which user actions are currently valid.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub mute: bool,
    pub send: bool,
    pub debug: bool,
}

impl Controls {
    pub fn for_state(state: SessionState, variant: Variant) -> Self {
        match state {
            SessionState::Idle => Self {
                start: true,
                ..Self::default()
            },
            SessionState::Starting => Self::default(),
            SessionState::Started => Self {
                start: false,
                stop: true,
                mute: variant.muting(),
                send: variant.data_channels(),
                debug: variant.debug_control(),
            },
        }
    }
}

pub struct SessionSnapshot {
    variant: Variant,
    state: Mutable<SessionState>,

    /// Bumped every time the session returns to [`SessionState::Idle`], so
    /// completions started in an earlier session can be told apart.
    epoch: Cell<u64>,
}

impl SessionSnapshot {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            state: Mutable::new(SessionState::Idle),
            epoch: Cell::new(0),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    pub fn signal(&self) -> impl Signal<Item = SessionState> {
        self.state.signal()
    }

    pub fn controls(&self) -> Controls {
        Controls::for_state(self.state.get(), self.variant)
    }

    pub fn controls_signal(&self) -> impl Signal<Item = Controls> {
        let variant = self.variant;
        self.state
            .signal_ref(move |state| Controls::for_state(*state, variant))
    }

    /// `Idle → Starting`. Returns `false` if the session isn't idle.
    pub fn begin(&self) -> bool {
        if self.state.get() != SessionState::Idle {
            return false;
        }
        self.state.set(SessionState::Starting);
        true
    }

    /// Marks the first answer of the primary peer as sent.
    ///
    /// Ignored when the session was stopped in the meantime.
    pub fn started(&self) -> bool {
        match self.state.get() {
            SessionState::Idle => false,
            SessionState::Starting | SessionState::Started => {
                self.state.set_neq(SessionState::Started);
                true
            }
        }
    }

    /// Returns to `Idle`. Returns `false` if the session already was idle.
    pub fn reset(&self) -> bool {
        if self.state.get() == SessionState::Idle {
            return false;
        }
        self.epoch.set(self.epoch.get() + 1);
        self.state.set(SessionState::Idle);
        true
    }
}
