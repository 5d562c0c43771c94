use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::message::ResponseError;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

pub type RequestHandler =
    Box<dyn Fn(Option<Value>, CancellationToken) -> BoxFuture<Result<Value, ResponseError>> + Send + Sync>;
pub type NotificationHandler = Box<dyn Fn(Option<Value>) -> BoxFuture<()> + Send + Sync>;

/// Handler tables for a connection, with a one-way freeze that takes effect
/// once the connection starts running.
///
/// Registering handlers concurrently with dispatch would mean a message
/// could race a handler being installed for its own method; freezing turns
/// that race into a predictable panic at registration time instead.
#[derive(Default)]
pub struct Registries {
    requests: Mutex<HashMap<String, RequestHandler>>,
    notifications: Mutex<HashMap<String, NotificationHandler>>,
    frozen: AtomicBool,
}

impl Registries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_request(&self, method: impl Into<String>, handler: RequestHandler) {
        assert!(
            !self.frozen.load(Ordering::Acquire),
            "cannot register a request handler after the connection has started running"
        );
        self.requests.lock().insert(method.into(), handler);
    }

    pub fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) {
        assert!(
            !self.frozen.load(Ordering::Acquire),
            "cannot register a notification handler after the connection has started running"
        );
        self.notifications.lock().insert(method.into(), handler);
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    pub fn with_request_handler<R>(&self, method: &str, f: impl FnOnce(Option<&RequestHandler>) -> R) -> R {
        let guard = self.requests.lock();
        f(guard.get(method))
    }

    pub fn with_notification_handler<R>(&self, method: &str, f: impl FnOnce(Option<&NotificationHandler>) -> R) -> R {
        let guard = self.notifications.lock();
        f(guard.get(method))
    }
}
