/// Bound required of a [`Protocol::LoopError`](crate::Protocol::LoopError).
///
/// The main loop needs to ask whether an error means "the peer went away"
/// (EOF, broken pipe, connection reset) versus some other failure, and it
/// needs to be able to manufacture one when the writer task has gone away.
pub trait LoopError: std::error::Error + Send + Sync + 'static {
	/// Constructs the error reported to callers whose outbound request was
	/// still pending when the connection shut down.
	fn closed() -> Self;
}
