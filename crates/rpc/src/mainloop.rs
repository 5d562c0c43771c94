use std::future::poll_fn;
use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tower_service::Service;

use crate::id::CounterIdGen;
use crate::pending::PendingTable;
use crate::protocol::{Inbound, Protocol};
use crate::service::RpcService;
use crate::socket::Socket;

/// Pumps messages between a transport and a service.
///
/// One `MainLoop` drives one connection. Construct it with [`MainLoop::new`],
/// which also hands back the [`Socket`] the service (and anything it
/// spawns) uses to send requests and notifications of its own, then call
/// [`MainLoop::run`] with the transport's reader and writer halves.
pub struct MainLoop<S, P: Protocol> {
	service: S,
	protocol: P,
	pending: Arc<PendingTable<P::Id, P::ReqResult, P::ReqError>>,
	outbound_tx: mpsc::UnboundedSender<P::Message>,
	outbound_rx: mpsc::UnboundedReceiver<P::Message>,
}

impl<S, P> MainLoop<S, P>
where
	P: Protocol + Clone,
	S: Service<P::Request, Response = P::ReqResult, Error = P::ReqError> + RpcService<P>,
	S::Future: Send + 'static,
{
	/// Builds a service via `make_service` (handing it the [`Socket`] it
	/// should use for outbound calls) and returns the resulting loop plus a
	/// clone of that same socket for the caller to hold on to.
	pub fn new(make_service: impl FnOnce(Socket<P>) -> S, protocol: P) -> (Self, Socket<P>) {
		let id_gen = Arc::new(CounterIdGen::new());
		let pending = Arc::new(PendingTable::new());
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let socket = Socket::new(id_gen, pending.clone(), outbound_tx.clone());

		let service = make_service(socket.clone());

		(
			Self {
				service,
				protocol,
				pending,
				outbound_tx,
				outbound_rx,
			},
			socket,
		)
	}

	/// Runs until the transport closes, the service ends the loop from a
	/// notification handler, or an unrecoverable protocol error occurs.
	///
	/// Every outstanding outbound request is failed with
	/// [`Protocol::closed_req_error`] before returning.
	pub async fn run(
		mut self,
		mut reader: impl AsyncBufRead + Unpin + Send,
		writer: impl AsyncWrite + Unpin + Send + 'static,
	) -> Result<(), P::LoopError>
	where
		P::Message: Send + 'static,
	{
		let writer_protocol = self.protocol.clone();
		let writer_task = tokio::spawn(Self::write_loop(self.outbound_rx, writer_protocol, writer));

		let result = self.read_loop(&mut reader).await;

		// Drop our sender clone so the writer task's receiver observes
		// closure once every in-flight response has been queued; the
		// `Socket` clones held by handler tasks may still be sending for a
		// moment longer, which is fine — we just wait for the writer to
		// finish draining.
		drop(self.outbound_tx);
		let _ = writer_task.await;

		self.pending.fail_all(P::closed_req_error);

		result
	}

	async fn read_loop(&mut self, reader: &mut (impl AsyncBufRead + Unpin + Send)) -> Result<(), P::LoopError> {
		loop {
			let msg = match self.protocol.read_message(reader).await {
				Ok(msg) => msg,
				Err(e) if P::is_disconnect(&e) => return Ok(()),
				Err(e) => match P::parse_error_response(&e) {
					Some(resp) => {
						if self.outbound_tx.send(resp).is_err() {
							return Err(e);
						}
						continue;
					}
					None => return Err(e),
				},
			};

			match P::split_inbound(msg) {
				Inbound::Request(req) => self.dispatch_request(req).await,
				Inbound::Response(resp) => {
					let id = P::response_id(&resp);
					let _ = self.pending.resolve(&id, P::response_outcome(resp));
				}
				Inbound::Notification(notif) => {
					if let ControlFlow::Break(outcome) = self.service.notify(notif) {
						return outcome;
					}
				}
			}
		}
	}

	/// Waits for the service to accept another request, dispatches it, and
	/// spawns a task that sends the eventual response back once the
	/// handler completes. Out-of-order completion relative to other
	/// in-flight requests is expected and correct.
	async fn dispatch_request(&mut self, req: P::Request) {
		let id = P::request_id(&req);

		if poll_fn(|cx| self.service.poll_ready(cx)).await.is_err() {
			return;
		}

		let fut = self.service.call(req);
		let outbound = self.outbound_tx.clone();
		tokio::spawn(async move {
			let resp = match fut.await {
				Ok(result) => P::response_ok(id, result),
				Err(err) => P::response_err(id, err),
			};
			let _ = outbound.send(P::wrap_response(resp));
		});
	}

	async fn write_loop(
		mut outbound_rx: mpsc::UnboundedReceiver<P::Message>,
		mut protocol: P,
		mut writer: impl AsyncWrite + Unpin + Send,
	) {
		while let Some(msg) = outbound_rx.recv().await {
			if protocol.write_message(&mut writer, &msg).await.is_err() {
				break;
			}
		}
	}
}
