//! Transport abstraction: how bytes actually move, decoupled from framing
//! and dispatch.

mod memory;
mod socket;
mod stdio;

pub use memory::{memory_pair, MemoryTransport};
pub use socket::TcpTransport;
pub use stdio::StdioTransport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};

/// A handle to a transport's connectedness, independent of the reader/writer
/// halves (which [`Transport::split`] consumes).
///
/// A handle gives a best-effort signal, not a forced OS-level teardown: it
/// doesn't reach into a socket and cancel an in-flight read. What it does
/// guarantee is that `connected()` reports `false` to anyone who checks it
/// after `close()` returns, and that a transport can expose this without
/// giving up its reader/writer halves first.
pub trait TransportHandle: Send + Sync {
    /// Marks the transport as closed. Idempotent.
    fn close(&self);
    /// Whether `close` has been called on this handle (or any clone of it).
    fn connected(&self) -> bool;
}

/// A [`TransportHandle`] backed by a shared flag — enough for any transport
/// that has no stronger shutdown primitive of its own to reach for.
#[derive(Debug, Clone)]
pub struct ConnectedFlag(Arc<AtomicBool>);

impl Default for ConnectedFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl ConnectedFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransportHandle for ConnectedFlag {
    fn close(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A concrete channel a [`crate::Connection`] can run over.
///
/// Implementors just need to produce a reader/writer pair; buffering,
/// framing, and shutdown coordination all live above this trait in
/// `Connection`.
pub trait Transport: Send + 'static {
    type Reader: AsyncBufRead + Unpin + Send + 'static;
    type Writer: AsyncWrite + Unpin + Send + 'static;
    type Handle: TransportHandle + Clone + 'static;

    /// A handle to this transport's connectedness, obtainable before
    /// `split` consumes the transport itself.
    fn handle(&self) -> Self::Handle;

    /// Consumes the transport and splits it into independent read/write
    /// halves suitable for handing to the main loop.
    fn split(self) -> (Self::Reader, Self::Writer);
}
