use std::sync::atomic::{AtomicU8, Ordering};

/// Where a connection sits in the LSP initialization/shutdown handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Waiting for the `initialize` request (and, after that, the
    /// `initialized` notification).
    Uninitialized = 0,
    /// Normal operation.
    Initialized = 1,
    /// `shutdown` has completed; only `exit` is accepted.
    ShuttingDown = 2,
    /// `exit` has been received; the connection is finished.
    Exited = 3,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Uninitialized,
            1 => ConnectionState::Initialized,
            2 => ConnectionState::ShuttingDown,
            _ => ConnectionState::Exited,
        }
    }
}

/// Atomic storage for [`ConnectionState`], shared between the dispatcher and
/// anything inspecting connection health from outside.
#[derive(Debug, Default)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Uninitialized as u8))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() != ConnectionState::Exited
    }
}
