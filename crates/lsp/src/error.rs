use crate::message::{ErrorCode, Message, Response, ResponseError};

/// Everything that can go wrong in a connection: framing, transport I/O, a
/// peer-reported RPC failure, or the connection simply being gone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The header block itself couldn't be parsed (missing or unparseable
    /// `Content-Length`, non-UTF-8 header line): the decoder no longer
    /// knows where the next frame starts, so there is nothing to recover —
    /// the connection must close.
    #[error("framing error: {0}")]
    Framing(String),

    /// Framing was intact (a `Content-Length` was read successfully) but
    /// the body it bounded was bad: zero-length, not valid JSON shaped
    /// like a request/notification/response, or otherwise unclassifiable.
    /// The decoder's position in the byte stream is unaffected, so the
    /// connection can report a JSON-RPC `ParseError` and keep reading.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] ResponseError),

    #[error("request cancelled")]
    Cancelled,

    #[error("connection closed")]
    Closed,

    #[error("response payload did not match the expected type: {0}")]
    Decode(#[source] serde_json::Error),
}

impl lsp_rpc::LoopError for Error {
    fn closed() -> Self {
        Error::Closed
    }
}

impl Error {
    /// The `ParseError` response to send for this error, if it represents a
    /// recoverable (framing-intact) read failure.
    pub(crate) fn parse_error_response(&self) -> Option<Message> {
        let detail = match self {
            Error::Protocol(msg) => msg.clone(),
            Error::Decode(err) => err.to_string(),
            Error::Io(_) | Error::Framing(_) | Error::Rpc(_) | Error::Cancelled | Error::Closed => return None,
        };
        Some(Message::Response(Response {
            id: None,
            result: Err(ResponseError::new(ErrorCode::ParseError, detail)),
        }))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
