//! Generic async RPC message pump and protocol framework.
//!
//! This crate knows nothing about JSON, HTTP-style framing, or LSP method
//! names. It factors the transport-agnostic half of a bidirectional RPC
//! connection into three pieces:
//!
//! - [`Protocol`]: how to read/write one wire message, and how to classify
//!   it into a request, response, or notification.
//! - [`PendingTable`]: correlates outbound requests with their eventual
//!   response by id.
//! - [`MainLoop`]: pumps inbound messages from a reader into a
//!   [`tower_service::Service`] (for requests) and an [`RpcService`] (for
//!   notifications), and serializes outbound messages onto a single writer.
//!
//! A concrete wire protocol (such as LSP's `Content-Length`-framed
//! JSON-RPC) is built by implementing [`Protocol`] and [`RpcService`] and
//! driving a [`MainLoop`] with them; see the `lsp-endpoint` crate for that
//! implementation.

mod error;
mod id;
mod mainloop;
mod pending;
mod protocol;
mod service;
mod socket;

pub use error::LoopError;
pub use id::CounterIdGen;
pub use mainloop::MainLoop;
pub use pending::PendingTable;
pub use protocol::{Inbound, Protocol};
pub use service::RpcService;
pub use socket::Socket;
