//! Asynchronous Language Server Protocol (LSP) framework based on tower.
//!
//! Built on top of `lsp-rpc`'s generic message pump, this crate supplies
//! the LSP-specific pieces: the `Content-Length`-framed JSON-RPC wire
//! format ([`codec`]), the request/notification/response message model
//! ([`message`]), a handful of [`transport`]s, and the [`Connection`] type
//! that ties framing, dispatch, and the `initialize`/`initialized`/
//! `shutdown`/`exit` lifecycle gate together.
//!
//! ```no_run
//! use lsp_endpoint::{Connection, transport::StdioTransport};
//!
//! # async fn run() -> lsp_endpoint::Result<()> {
//! let connection = Connection::new();
//! connection.on_request("initialize", |_params, _cancel| async move {
//!     Ok::<_, lsp_endpoint::ResponseError>(serde_json::json!({ "capabilities": {} }))
//! });
//! connection.run(StdioTransport::new()).await
//! # }
//! ```

pub mod codec;
mod connection;
pub mod error;
mod lifecycle;
pub mod message;
pub mod protocol;
mod registry;
pub mod transport;

pub use connection::{Connection, ConnectionBuilder, Emitter};
pub use error::{Error, Result};
pub use lifecycle::ConnectionState;
pub use message::{ErrorCode, Message, Notification, Request, RequestId, Response, ResponseError};
pub use protocol::JsonRpcProtocol;
