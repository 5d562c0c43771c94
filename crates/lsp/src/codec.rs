//! `Content-Length`-framed JSON-RPC, decoupled from any particular IO model.
//!
//! [`FrameDecoder`] is a chunk-at-a-time state machine: feed it arbitrarily
//! sized slices of bytes (one byte at a time, or the whole stream at once —
//! it doesn't matter) and it yields every [`Message`] it can assemble. It
//! also backs the [`tokio_util::codec::Decoder`] impl used when driving a
//! connection over a real transport via `Framed`.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::message::Message;

const HEADER_SEP: &str = "\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitHeaders,
    AwaitBody(usize),
}

/// Parses the `Content-Length` out of a raw header block.
///
/// Unknown headers (`Content-Type`, anything else) are ignored per the
/// wire's lenient-header rule. The length must be present, parse as a
/// non-negative integer, and be nonzero.
fn parse_content_length(headers: &str) -> Result<usize, Error> {
    for line in headers.split("\r\n") {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            let value = value.trim();
            let len: usize = value
                .parse()
                .map_err(|_| Error::Framing(format!("invalid Content-Length: {value:?}")))?;
            if len == 0 {
                return Err(Error::Protocol("Content-Length must not be zero".to_string()));
            }
            return Ok(len);
        }
    }
    Err(Error::Framing("missing Content-Length header".to_string()))
}

fn decode_body(body: &[u8]) -> Result<Message, Error> {
    let value: Value = serde_json::from_slice(body).map_err(Error::Decode)?;
    Message::from_value(value).map_err(Error::Protocol)
}

/// Encodes one message as a `Content-Length` frame.
#[must_use]
pub fn encode_message(msg: &Message) -> Vec<u8> {
    let body = serde_json::to_vec(&msg.to_value()).expect("message encodes to JSON");
    let mut out = Vec::with_capacity(body.len() + 32);
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(&body);
    out
}

/// A push-based, chunk-independent decoder: the same byte stream split into
/// any number of pieces produces the same sequence of decoded messages.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: State,
}

impl Default for State {
    fn default() -> Self {
        State::AwaitHeaders
    }
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds `chunk` into the decoder's internal buffer and returns every
    /// message that can now be fully assembled.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Message>, Error> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            match self.state {
                State::AwaitHeaders => {
                    let Some(sep) = find_subslice(&self.buf, HEADER_SEP.as_bytes()) else {
                        break;
                    };
                    let headers = std::str::from_utf8(&self.buf[..sep])
                        .map_err(|_| Error::Framing("headers are not valid UTF-8".to_string()))?
                        .to_string();
                    let len = parse_content_length(&headers)?;
                    self.buf.advance(sep + HEADER_SEP.len());
                    self.state = State::AwaitBody(len);
                }
                State::AwaitBody(len) => {
                    if self.buf.len() < len {
                        break;
                    }
                    let body = self.buf.split_to(len);
                    out.push(decode_body(&body)?);
                    self.state = State::AwaitHeaders;
                }
            }
        }
        Ok(out)
    }

    /// Discards any partially-assembled frame and returns to the initial
    /// state, used after a protocol error to resynchronize on the next
    /// well-formed header block.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = State::AwaitHeaders;
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// `tokio_util::codec` adapter around [`FrameDecoder`], for use with
/// `Framed` when a transport is driven through a codec rather than directly
/// against `AsyncBufRead`.
#[derive(Debug, Default)]
pub struct LspCodec {
    decoder: FrameDecoder,
}

impl LspCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LspCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Error> {
        let chunk = src.split();
        let mut messages = self.decoder.feed(&chunk)?;
        if messages.is_empty() {
            return Ok(None);
        }
        // `Framed` calls `decode` once per yielded item; stash any extras
        // back so they aren't dropped, emitting in order.
        let first = messages.remove(0);
        for extra in messages.into_iter().rev() {
            let bytes = encode_message(&extra);
            src.extend_from_slice(&bytes);
        }
        Ok(Some(first))
    }
}

impl Encoder<Message> for LspCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Error> {
        dst.extend_from_slice(&encode_message(&item));
        Ok(())
    }
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;
    use crate::message::{Notification, Request, RequestId};

    fn request_with(id: i64, method: String, text: String) -> Message {
        Message::Request(Request {
            id: RequestId::Integer(id),
            method,
            params: Some(serde_json::json!({"text": text})),
        })
    }

    fn notification_with(method: String, text: String) -> Message {
        Message::Notification(Notification {
            method,
            params: Some(serde_json::json!({"text": text})),
        })
    }

    fn arb_message() -> impl Strategy<Value = Message> {
        prop_oneof![
            (any::<i64>(), "[a-zA-Z/]{1,16}", ".{0,64}").prop_map(|(id, m, t)| request_with(id, m, t)),
            ("[a-zA-Z/]{1,16}", ".{0,64}").prop_map(|(m, t)| notification_with(m, t)),
        ]
    }

    fn method_and_params(msg: &Message) -> (&str, Option<&Value>) {
        match msg {
            Message::Request(r) => (r.method.as_str(), r.params.as_ref()),
            Message::Notification(n) => (n.method.as_str(), n.params.as_ref()),
            Message::Response(_) => unreachable!("arb_message never generates responses"),
        }
    }

    proptest! {
        /// Encoding a message and feeding the bytes back through a fresh
        /// decoder always yields exactly that message.
        #[test]
        fn round_trips_through_encode_and_decode(msg in arb_message()) {
            let bytes = encode_message(&msg);
            let mut decoder = FrameDecoder::new();
            let out = decoder.feed(&bytes).unwrap();
            prop_assert_eq!(out.len(), 1);
            prop_assert_eq!(method_and_params(&out[0]), method_and_params(&msg));
        }

        /// However a stream of concatenated frames is split into chunks fed
        /// one at a time, the decoder assembles the same sequence of
        /// messages as feeding the whole stream at once.
        #[test]
        fn decoding_is_independent_of_chunk_boundaries(
            msgs in prop::collection::vec(arb_message(), 1..8),
            splits in prop::collection::vec(1usize..64, 0..16),
        ) {
            let mut bytes = Vec::new();
            for msg in &msgs {
                bytes.extend(encode_message(msg));
            }

            let mut whole = FrameDecoder::new();
            let expected = whole.feed(&bytes).unwrap();
            prop_assert_eq!(expected.len(), msgs.len());

            let mut chunked = FrameDecoder::new();
            let mut out = Vec::new();
            let mut pos = 0;
            for step in &splits {
                if pos >= bytes.len() {
                    break;
                }
                let end = (pos + step).min(bytes.len());
                out.extend(chunked.feed(&bytes[pos..end]).unwrap());
                pos = end;
            }
            if pos < bytes.len() {
                out.extend(chunked.feed(&bytes[pos..]).unwrap());
            }

            prop_assert_eq!(out.len(), expected.len());
            for (a, b) in out.iter().zip(expected.iter()) {
                prop_assert_eq!(method_and_params(a), method_and_params(b));
            }
        }
    }
}
