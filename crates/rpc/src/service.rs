use std::ops::ControlFlow;

use crate::protocol::Protocol;

/// The half of dispatch that `tower_service::Service` does not model:
/// fire-and-forget notifications, and the service's own decision about
/// whether a notification (or an internal failure while handling one)
/// should bring the connection down.
///
/// Inbound *requests* are handled by implementing
/// `tower_service::Service<P::Request, Response = P::ReqResult, Error =
/// P::ReqError>` on the same type; the main loop requires both.
pub trait RpcService<P: Protocol>: Send + 'static {
	/// Handles an inbound notification.
	///
	/// Returning `ControlFlow::Break(result)` tells the main loop to stop
	/// pumping messages and return `result`; returning `Continue(())` keeps
	/// the connection running regardless of whether the notification itself
	/// was handled successfully (errors are the service's responsibility
	/// to log).
	fn notify(&mut self, notif: P::Notification) -> ControlFlow<Result<(), P::LoopError>>;
}
