use std::future::Future;
use std::hash::Hash;

use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::error::LoopError;

/// The result of classifying a decoded [`Protocol::Message`].
pub enum Inbound<Request, Response, Notification> {
	Request(Request),
	Response(Response),
	Notification(Notification),
}

/// A concrete wire protocol the generic [`MainLoop`](crate::MainLoop) can
/// drive.
///
/// Implementors own framing (how bytes on the wire become one `Message`)
/// and classification (what kind of message it is), but not dispatch —
/// that is the job of the `tower_service::Service` and [`RpcService`] the
/// main loop is parameterized with.
pub trait Protocol: Send + 'static {
	/// Correlates an outbound request with its response.
	type Id: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static;
	/// One complete wire message, as read from or written to the
	/// transport.
	type Message: Send + 'static;
	/// An inbound (or outbound, before sending) request.
	type Request: Send + 'static;
	/// A response to a request.
	type Response: Send + 'static;
	/// A fire-and-forget message.
	type Notification: Send + 'static;
	/// The success payload carried by a [`Self::Response`].
	type ReqResult: Send + 'static;
	/// The failure payload carried by a [`Self::Response`].
	type ReqError: Send + 'static;
	/// Error produced by I/O or framing failures.
	type LoopError: LoopError;

	/// Reads exactly one message from `input`.
	///
	/// Implementations read as many bytes as needed to complete a message
	/// and no more, so that a shared reader can be fed to repeated calls.
	fn read_message(
		&mut self,
		input: &mut (impl AsyncBufRead + Unpin + Send),
	) -> impl Future<Output = Result<Self::Message, Self::LoopError>> + Send;

	/// Writes exactly one message to `output`, including a final flush.
	fn write_message(
		&mut self,
		output: &mut (impl AsyncWrite + Unpin + Send),
		msg: &Self::Message,
	) -> impl Future<Output = Result<(), Self::LoopError>> + Send;

	/// Classifies a decoded message.
	fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response, Self::Notification>;

	/// Converts a raw counter value (from [`CounterIdGen`](crate::CounterIdGen))
	/// into this protocol's id representation.
	fn id_from_counter(n: u64) -> Self::Id;

	/// Extracts the id from a request.
	fn request_id(req: &Self::Request) -> Self::Id;
	/// Overwrites a request's id, used when the main loop allocates one for
	/// an outbound request.
	fn set_request_id(req: &mut Self::Request, id: Self::Id);
	/// Extracts the id a response correlates to.
	fn response_id(resp: &Self::Response) -> Self::Id;

	/// Wraps a request as a wire message.
	fn wrap_request(req: Self::Request) -> Self::Message;
	/// Wraps a response as a wire message.
	fn wrap_response(resp: Self::Response) -> Self::Message;
	/// Wraps a notification as a wire message.
	fn wrap_notification(notif: Self::Notification) -> Self::Message;

	/// Builds a successful response for `id`.
	fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response;
	/// Builds an error response for `id`.
	fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response;
	/// Splits a decoded response into its success/error outcome.
	fn response_outcome(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError>;

	/// Whether `err` represents the peer disconnecting normally (as opposed
	/// to a protocol violation worth surfacing loudly).
	fn is_disconnect(err: &Self::LoopError) -> bool;

	/// The `ReqError` delivered to every outbound request still awaiting a
	/// response when the connection closes.
	fn closed_req_error() -> Self::ReqError;

	/// Builds a synthetic response for a recoverable read failure: framing
	/// stayed intact (the decoder knows where the next message starts) but
	/// the payload itself didn't decode or classify. Returning `Some` keeps
	/// the read loop running after sending the response; the default `None`
	/// treats every read error as fatal, which is correct for protocols
	/// that can't tell a recoverable payload error from a framing error.
	fn parse_error_response(_err: &Self::LoopError) -> Option<Self::Message> {
		None
	}
}
