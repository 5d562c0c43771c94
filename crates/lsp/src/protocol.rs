//! Wires the message model and codec into an [`lsp_rpc::Protocol`]
//! implementation the generic main loop can drive.

use lsp_rpc::Inbound;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::encode_message;
use crate::error::Error;
use crate::message::{ErrorCode, Message, Notification, Request, RequestId, Response, ResponseError};

const CONTENT_LENGTH: &str = "content-length";

/// Stateless `Content-Length`-framed JSON-RPC over any buffered transport.
///
/// Unlike [`crate::codec::FrameDecoder`] (which buffers its own bytes so it
/// can be fed arbitrary chunks), this reads directly against an
/// `AsyncBufRead`, relying on the reader's own buffering — there is nothing
/// to carry between calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcProtocol;

impl JsonRpcProtocol {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn read_headers(
        input: &mut (impl AsyncBufRead + Unpin + Send),
    ) -> Result<Option<usize>, Error> {
        let mut content_length = None;
        loop {
            let mut line = Vec::new();
            let n = input.read_until(b'\n', &mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
                line.pop();
            }
            if line.is_empty() {
                break;
            }
            let line = String::from_utf8(line)
                .map_err(|_| Error::Framing("header line is not valid UTF-8".to_string()))?;
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                    let value = value.trim();
                    let len: usize = value
                        .parse()
                        .map_err(|_| Error::Framing(format!("invalid Content-Length: {value:?}")))?;
                    content_length = Some(len);
                }
            }
        }
        Ok(Some(content_length.ok_or_else(|| {
            Error::Framing("missing Content-Length header".to_string())
        })?))
    }
}

impl lsp_rpc::Protocol for JsonRpcProtocol {
    type Id = RequestId;
    type Message = Message;
    type Request = Request;
    type Response = Response;
    type Notification = Notification;
    type ReqResult = Value;
    type ReqError = ResponseError;
    type LoopError = Error;

    async fn read_message(
        &mut self,
        input: &mut (impl AsyncBufRead + Unpin + Send),
    ) -> Result<Self::Message, Self::LoopError> {
        let Some(len) = Self::read_headers(input).await? else {
            return Err(Error::Closed);
        };
        if len == 0 {
            return Err(Error::Protocol("Content-Length must not be zero".to_string()));
        }
        let mut body = vec![0u8; len];
        input.read_exact(&mut body).await?;
        let value: Value = serde_json::from_slice(&body).map_err(Error::Decode)?;
        Message::from_value(value).map_err(Error::Protocol)
    }

    async fn write_message(
        &mut self,
        output: &mut (impl AsyncWrite + Unpin + Send),
        msg: &Self::Message,
    ) -> Result<(), Self::LoopError> {
        let bytes = encode_message(msg);
        output.write_all(&bytes).await?;
        output.flush().await?;
        Ok(())
    }

    fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response, Self::Notification> {
        match msg {
            Message::Request(req) => Inbound::Request(req),
            Message::Response(resp) => Inbound::Response(resp),
            Message::Notification(notif) => Inbound::Notification(notif),
        }
    }

    fn id_from_counter(n: u64) -> Self::Id {
        RequestId::Integer(i64::try_from(n).unwrap_or(i64::MAX))
    }

    fn request_id(req: &Self::Request) -> Self::Id {
        req.id.clone()
    }

    fn set_request_id(req: &mut Self::Request, id: Self::Id) {
        req.id = id;
    }

    fn response_id(resp: &Self::Response) -> Self::Id {
        resp.id.clone().unwrap_or(RequestId::Integer(i64::MIN))
    }

    fn wrap_request(req: Self::Request) -> Self::Message {
        Message::Request(req)
    }

    fn wrap_response(resp: Self::Response) -> Self::Message {
        Message::Response(resp)
    }

    fn wrap_notification(notif: Self::Notification) -> Self::Message {
        Message::Notification(notif)
    }

    fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response {
        Response {
            id: Some(id),
            result: Ok(result),
        }
    }

    fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response {
        Response {
            id: Some(id),
            result: Err(error),
        }
    }

    fn response_outcome(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError> {
        resp.result
    }

    fn is_disconnect(err: &Self::LoopError) -> bool {
        matches!(err, Error::Closed)
    }

    fn closed_req_error() -> Self::ReqError {
        ResponseError::new(ErrorCode::RequestCancelled, "connection closed")
    }

    fn parse_error_response(err: &Self::LoopError) -> Option<Self::Message> {
        err.parse_error_response()
    }
}
