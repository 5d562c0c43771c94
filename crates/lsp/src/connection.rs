use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tower_service::Service;

use lsp_rpc::{MainLoop, Protocol as _, Socket};

use crate::error::{Error, Result};
use crate::lifecycle::{ConnectionState, Lifecycle};
use crate::message::{ErrorCode, Notification, Request, RequestId, ResponseError};
use crate::protocol::JsonRpcProtocol;
use crate::registry::Registries;
use crate::transport::{MemoryTransport, Transport, TransportHandle};

const INITIALIZE: &str = "initialize";
const INITIALIZED: &str = "initialized";
const SHUTDOWN: &str = "shutdown";
const EXIT: &str = "exit";
const CANCEL_REQUEST: &str = "$/cancelRequest";

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

struct Shared {
    registries: Registries,
    lifecycle: Lifecycle,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
    permissive_initialize_ordering: bool,
    initialize_responded: AtomicBool,
    /// Cancelled by [`Connection::close`] to interrupt a `run` in progress.
    shutdown: CancellationToken,
}

/// Builds a [`Connection`] with nonstandard lifecycle behavior opted into
/// explicitly; the defaults match the strict gate described for
/// [`ConnectionState`].
pub struct ConnectionBuilder {
    permissive_initialize_ordering: bool,
}

impl ConnectionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            permissive_initialize_ordering: false,
        }
    }

    /// When set, requests sent after a successful `initialize` response but
    /// before the `initialized` notification are accepted rather than
    /// rejected with `ServerNotInitialized`. Some clients are known to race
    /// the two; default is the strict table behavior.
    #[must_use]
    pub fn permissive_initialize_ordering(mut self, yes: bool) -> Self {
        self.permissive_initialize_ordering = yes;
        self
    }

    #[must_use]
    pub fn build(self) -> Connection {
        let shared = Arc::new(Shared {
            registries: Registries::new(),
            lifecycle: Lifecycle::new(),
            in_flight: Mutex::new(HashMap::new()),
            permissive_initialize_ordering: self.permissive_initialize_ordering,
            initialize_responded: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });
        let service_shared = shared.clone();
        let (main_loop, socket) = MainLoop::new(
            move |_socket| ConnectionService { shared: service_shared },
            JsonRpcProtocol::new(),
        );
        Connection {
            inner: Arc::new(Inner {
                shared,
                socket,
                main_loop: Mutex::new(Some(main_loop)),
                transport_handle: Mutex::new(None),
            }),
        }
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Inner {
    shared: Arc<Shared>,
    socket: Socket<JsonRpcProtocol>,
    main_loop: Mutex<Option<MainLoop<ConnectionService, JsonRpcProtocol>>>,
    /// Set once [`Connection::run`] has split a transport, so `close` has
    /// something to call `close` on in turn. `None` before `run` starts.
    transport_handle: Mutex<Option<Box<dyn TransportHandle>>>,
}

/// A running (or not-yet-started) LSP connection: handler registration,
/// outbound requests/notifications, and the lifecycle gate, independent of
/// which [`Transport`] eventually carries the bytes.
///
/// Cheap to clone — clones share the same handler tables, lifecycle state,
/// and outbound channel, which is what lets a handler capture its own
/// `Connection` to make further calls.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    #[must_use]
    pub fn new() -> Self {
        ConnectionBuilder::new().build()
    }

    #[must_use]
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Registers a handler for an inbound request method. Panics if called
    /// after [`Connection::run`] has started.
    pub fn on_request<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, ResponseError>> + Send + 'static,
    {
        self.inner.shared.registries.on_request(
            method,
            Box::new(move |params, token| Box::pin(handler(params, token))),
        );
    }

    /// Registers a handler for an inbound notification method. Panics if
    /// called after [`Connection::run`] has started.
    pub fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner
            .shared
            .registries
            .on_notification(method, Box::new(move |params| Box::pin(handler(params))));
    }

    /// Issues an outbound request and awaits its response.
    pub async fn request<P, R>(&self, method: impl Into<String>, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(Error::Decode)?;
        let req = Request {
            id: RequestId::Integer(0),
            method: method.into(),
            params: Some(params),
        };
        let rx = self.inner.socket.call(req)?;
        let outcome = rx.await.map_err(|_| Error::Closed)?;
        let value = outcome.map_err(Error::Rpc)?;
        serde_json::from_value(value).map_err(Error::Decode)
    }

    /// Sends an outbound notification.
    pub fn notify<P: Serialize>(&self, method: impl Into<String>, params: P) -> Result<()> {
        let params = serde_json::to_value(params).map_err(Error::Decode)?;
        let notif = Notification {
            method: method.into(),
            params: Some(params),
        };
        self.inner.socket.send(JsonRpcProtocol::wrap_notification(notif))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lifecycle.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.shared.lifecycle.is_connected()
    }

    /// Marks the connection exited, interrupts `run` if it is in progress,
    /// fails every outstanding outbound request, and closes the transport
    /// `run` is (or was) driving. Idempotent.
    pub fn close(&self) {
        self.inner.shared.lifecycle.set(ConnectionState::Exited);
        self.inner.shared.shutdown.cancel();
        self.inner.socket.pending().fail_all(JsonRpcProtocol::closed_req_error);
        if let Some(handle) = self.inner.transport_handle.lock().as_ref() {
            handle.close();
        }
    }

    /// Freezes handler registration and drives the connection over
    /// `transport` until the peer disconnects, an `exit` notification
    /// arrives, an unrecoverable protocol error occurs, or [`Connection::close`]
    /// is called.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same `Connection` (or any of
    /// its clones) — there is exactly one main loop per connection and it
    /// can only run once.
    pub async fn run<T: Transport>(&self, transport: T) -> Result<()> {
        self.inner.shared.registries.freeze();
        let main_loop = self
            .inner
            .main_loop
            .lock()
            .take()
            .expect("Connection::run must only be called once");
        *self.inner.transport_handle.lock() = Some(Box::new(transport.handle()));
        let (reader, writer) = transport.split();
        let shutdown = self.inner.shared.shutdown.clone();
        tokio::select! {
            result = main_loop.run(reader, writer) => result?,
            _ = shutdown.cancelled() => {}
        }
        Ok(())
    }

    /// Runs this connection over an in-memory transport instead of a real
    /// one, returning the other end as an [`Emitter`]: an embedder (a
    /// browser extension host, a WASM sandbox, anything without its own
    /// byte stream to hand `run` directly) feeds inbound bytes in via
    /// [`Emitter::receive`] and drains outbound bytes via
    /// [`Emitter::outgoing`].
    #[must_use]
    pub fn run_emitter(&self) -> Emitter {
        let (inside, outside) = crate::transport::memory_pair();
        let connection = self.clone();
        let task = tokio::spawn(async move { connection.run(inside).await });
        let (reader, writer) = outside.split();
        Emitter {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            task,
        }
    }
}

/// The other half of a [`Connection::run_emitter`] connection: a pair of
/// byte-level faucets an embedder drives directly, with no transport of
/// its own.
pub struct Emitter {
    reader: tokio::sync::Mutex<<MemoryTransport as Transport>::Reader>,
    writer: tokio::sync::Mutex<<MemoryTransport as Transport>::Writer>,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl Emitter {
    /// Feeds inbound bytes (as read off whatever channel the embedder owns)
    /// into the connection.
    pub async fn receive(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Waits for and returns the next chunk of bytes the connection has
    /// written, or `None` once the connection has closed and no more bytes
    /// will ever arrive.
    pub async fn outgoing(&self) -> Option<Bytes> {
        let mut buf = [0u8; 8192];
        let mut reader = self.reader.lock().await;
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => None,
            Ok(n) => Some(Bytes::copy_from_slice(&buf[..n])),
        }
    }

    /// Awaits the background `run` task driving this connection, returning
    /// whatever it returned.
    pub async fn join(self) -> Result<()> {
        self.task.await.map_err(|_| Error::Closed)?
    }
}

fn extract_cancel_id(params: &Value) -> Option<RequestId> {
    params.get("id").and_then(|v| serde_json::from_value(v.clone()).ok())
}

struct ConnectionService {
    shared: Arc<Shared>,
}

impl Service<Request> for ConnectionService {
    type Response = Value;
    type Error = ResponseError;
    type Future = BoxFuture<std::result::Result<Value, ResponseError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), ResponseError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let shared = self.shared.clone();
        Box::pin(async move {
            let Request { id, method, params } = req;

            let state = shared.lifecycle.state();
            if state == ConnectionState::Exited {
                return Err(ResponseError::new(ErrorCode::InvalidRequest, "connection has exited"));
            }

            let initialize_in_flight_ok =
                shared.permissive_initialize_ordering && shared.initialize_responded.load(Ordering::Acquire);
            let gate_ok = match state {
                ConnectionState::Uninitialized => method == INITIALIZE || initialize_in_flight_ok,
                ConnectionState::Initialized => true,
                ConnectionState::ShuttingDown => false,
                ConnectionState::Exited => false,
            };
            if !gate_ok {
                return Err(match state {
                    ConnectionState::Uninitialized => {
                        ResponseError::new(ErrorCode::ServerNotInitialized, "server not initialized")
                    }
                    _ => ResponseError::new(ErrorCode::InvalidRequest, "connection is shutting down"),
                });
            }

            if method == INITIALIZE && state != ConnectionState::Uninitialized {
                return Err(ResponseError::new(ErrorCode::InvalidRequest, "already initialized"));
            }

            let token = {
                let mut in_flight = shared.in_flight.lock();
                if in_flight.contains_key(&id) {
                    return Err(ResponseError::new(ErrorCode::InvalidRequest, "duplicate request id"));
                }
                let token = CancellationToken::new();
                in_flight.insert(id.clone(), token.clone());
                token
            };

            let handler_fut = shared
                .registries
                .with_request_handler(&method, |handler| handler.map(|h| h(params.clone(), token.clone())));

            let outcome = match handler_fut {
                Some(fut) => fut.await,
                None if method == SHUTDOWN => Ok(Value::Null),
                None => Err(ResponseError::new(
                    ErrorCode::MethodNotFound,
                    format!("unknown method {method}"),
                )),
            };

            shared.in_flight.lock().remove(&id);

            if outcome.is_ok() && method == SHUTDOWN {
                shared.lifecycle.set(ConnectionState::ShuttingDown);
            }
            if outcome.is_ok() && method == INITIALIZE {
                shared.initialize_responded.store(true, Ordering::Release);
            }

            outcome
        })
    }
}

impl lsp_rpc::RpcService<JsonRpcProtocol> for ConnectionService {
    fn notify(&mut self, notif: Notification) -> ControlFlow<Result<()>> {
        let shared = self.shared.clone();
        let Notification { method, params } = notif;

        if shared.lifecycle.state() == ConnectionState::Exited {
            return ControlFlow::Continue(());
        }

        if method == CANCEL_REQUEST {
            if let Some(id) = params.as_ref().and_then(extract_cancel_id) {
                if let Some(token) = shared.in_flight.lock().get(&id) {
                    token.cancel();
                }
            }
            return ControlFlow::Continue(());
        }

        if method == EXIT {
            shared.lifecycle.set(ConnectionState::Exited);
            if let Some(fut) = shared
                .registries
                .with_notification_handler(&method, |h| h.map(|h| h(params.clone())))
            {
                tokio::spawn(fut);
            }
            return ControlFlow::Break(Ok(()));
        }

        if method == INITIALIZED {
            shared.lifecycle.set(ConnectionState::Initialized);
        }

        let allowed = match shared.lifecycle.state() {
            ConnectionState::Uninitialized => method == INITIALIZED,
            ConnectionState::Exited => false,
            _ => true,
        };
        if !allowed {
            tracing::warn!(method = %method, "dropping notification received before initialization");
            return ControlFlow::Continue(());
        }

        if let Some(fut) = shared
            .registries
            .with_notification_handler(&method, |h| h.map(|h| h(params)))
        {
            tokio::spawn(fut);
        }

        ControlFlow::Continue(())
    }
}
