use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::LoopError;
use crate::id::CounterIdGen;
use crate::pending::PendingTable;
use crate::protocol::Protocol;

/// The outbound half of a connection, handed to a service before the main
/// loop starts so it can issue requests and notifications of its own.
///
/// Cloning a `Socket` is cheap; all clones share the same outbound channel,
/// id generator, and pending table, which is what lets independently
/// spawned handler tasks each hold one.
pub struct Socket<P: Protocol> {
	id_gen: Arc<CounterIdGen>,
	pending: Arc<PendingTable<P::Id, P::ReqResult, P::ReqError>>,
	outbound: mpsc::UnboundedSender<P::Message>,
}

impl<P: Protocol> Clone for Socket<P> {
	fn clone(&self) -> Self {
		Self {
			id_gen: self.id_gen.clone(),
			pending: self.pending.clone(),
			outbound: self.outbound.clone(),
		}
	}
}

impl<P: Protocol> Socket<P> {
	pub(crate) fn new(
		id_gen: Arc<CounterIdGen>,
		pending: Arc<PendingTable<P::Id, P::ReqResult, P::ReqError>>,
		outbound: mpsc::UnboundedSender<P::Message>,
	) -> Self {
		Self {
			id_gen,
			pending,
			outbound,
		}
	}

	/// Sends a pre-built message without expecting a response.
	///
	/// Used for notifications, and for responses the dispatcher produces
	/// for inbound requests. Fails only once the main loop has shut down.
	pub fn send(&self, msg: P::Message) -> Result<(), P::LoopError> {
		self.outbound.send(msg).map_err(|_| P::LoopError::closed())
	}

	/// Allocates a fresh id, sends `req` (with that id set), and returns a
	/// receiver that resolves when the matching response arrives.
	pub fn call(
		&self,
		mut req: P::Request,
	) -> Result<tokio::sync::oneshot::Receiver<Result<P::ReqResult, P::ReqError>>, P::LoopError> {
		let id = P::id_from_counter(self.id_gen.next());
		P::set_request_id(&mut req, id.clone());
		let rx = self.pending.insert(id.clone());
		if self.outbound.send(P::wrap_request(req)).is_err() {
			self.pending.remove(&id);
			return Err(P::LoopError::closed());
		}
		Ok(rx)
	}

	/// The pending-request table, exposed so protocol-specific layers (the
	/// LSP connection's `$/cancelRequest` handling, for instance) can
	/// resolve or drop entries directly.
	pub fn pending(&self) -> &Arc<PendingTable<P::Id, P::ReqResult, P::ReqError>> {
		&self.pending
	}
}
