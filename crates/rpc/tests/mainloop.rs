//! Exercises `MainLoop` against a toy newline-delimited protocol.
//!
//! This deliberately avoids any JSON-RPC or LSP framing — that lives in
//! `lsp-endpoint` — and only proves that the generic pump correlates
//! requests/responses and dispatches notifications correctly.

use std::ops::ControlFlow;
use std::task::{Context, Poll};

use lsp_rpc::{Inbound, LoopError, MainLoop, Protocol, RpcService, Socket};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tower_service::Service;

#[derive(Debug, thiserror::Error)]
enum EchoError {
	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
	#[error("connection closed")]
	Closed,
	#[error("malformed line: {0}")]
	Malformed(String),
}

impl LoopError for EchoError {
	fn closed() -> Self {
		EchoError::Closed
	}
}

/// Wire message: `req:<id>:<payload>`, `res:<id>:<payload>`,
/// `err:<id>:<payload>`, or `note:<payload>`.
#[derive(Debug, Clone)]
enum Msg {
	Req(u64, String),
	Res(u64, String),
	Err(u64, String),
	Note(String),
}

#[derive(Debug, Clone, Copy, Default)]
struct EchoProtocol;

impl Protocol for EchoProtocol {
	type Id = u64;
	type Message = Msg;
	type Request = (u64, String);
	type Response = Result<(u64, String), (u64, String)>;
	type Notification = String;
	type ReqResult = String;
	type ReqError = String;
	type LoopError = EchoError;

	async fn read_message(
		&mut self,
		input: &mut (impl tokio::io::AsyncBufRead + Unpin + Send),
	) -> Result<Self::Message, Self::LoopError> {
		let mut line = String::new();
		let n = input.read_line(&mut line).await?;
		if n == 0 {
			return Err(EchoError::Closed);
		}
		let line = line.trim_end_matches('\n');
		let mut parts = line.splitn(3, ':');
		let kind = parts.next().unwrap_or_default();
		match kind {
			"req" => {
				let id: u64 = parts.next().unwrap().parse().unwrap();
				let payload = parts.next().unwrap_or_default().to_string();
				Ok(Msg::Req(id, payload))
			}
			"res" => {
				let id: u64 = parts.next().unwrap().parse().unwrap();
				let payload = parts.next().unwrap_or_default().to_string();
				Ok(Msg::Res(id, payload))
			}
			"err" => {
				let id: u64 = parts.next().unwrap().parse().unwrap();
				let payload = parts.next().unwrap_or_default().to_string();
				Ok(Msg::Err(id, payload))
			}
			"note" => Ok(Msg::Note(parts.next().unwrap_or_default().to_string())),
			other => Err(EchoError::Malformed(other.to_string())),
		}
	}

	async fn write_message(
		&mut self,
		output: &mut (impl tokio::io::AsyncWrite + Unpin + Send),
		msg: &Self::Message,
	) -> Result<(), Self::LoopError> {
		let line = match msg {
			Msg::Req(id, p) => format!("req:{id}:{p}\n"),
			Msg::Res(id, p) => format!("res:{id}:{p}\n"),
			Msg::Err(id, p) => format!("err:{id}:{p}\n"),
			Msg::Note(p) => format!("note:{p}\n"),
		};
		output.write_all(line.as_bytes()).await?;
		output.flush().await?;
		Ok(())
	}

	fn split_inbound(msg: Self::Message) -> Inbound<Self::Request, Self::Response, Self::Notification> {
		match msg {
			Msg::Req(id, p) => Inbound::Request((id, p)),
			Msg::Res(id, p) => Inbound::Response(Ok((id, p))),
			Msg::Err(id, p) => Inbound::Response(Err((id, p))),
			Msg::Note(p) => Inbound::Notification(p),
		}
	}

	fn id_from_counter(n: u64) -> Self::Id {
		n
	}

	fn request_id(req: &Self::Request) -> Self::Id {
		req.0
	}

	fn set_request_id(req: &mut Self::Request, id: Self::Id) {
		req.0 = id;
	}

	fn response_id(resp: &Self::Response) -> Self::Id {
		match resp {
			Ok((id, _)) | Err((id, _)) => *id,
		}
	}

	fn wrap_request(req: Self::Request) -> Self::Message {
		Msg::Req(req.0, req.1)
	}

	fn wrap_response(resp: Self::Response) -> Self::Message {
		match resp {
			Ok((id, p)) => Msg::Res(id, p),
			Err((id, p)) => Msg::Err(id, p),
		}
	}

	fn wrap_notification(notif: Self::Notification) -> Self::Message {
		Msg::Note(notif)
	}

	fn response_ok(id: Self::Id, result: Self::ReqResult) -> Self::Response {
		Ok((id, result))
	}

	fn response_err(id: Self::Id, error: Self::ReqError) -> Self::Response {
		Err((id, error))
	}

	fn response_outcome(resp: Self::Response) -> Result<Self::ReqResult, Self::ReqError> {
		match resp {
			Ok((_, p)) => Ok(p),
			Err((_, p)) => Err(p),
		}
	}

	fn is_disconnect(err: &Self::LoopError) -> bool {
		matches!(err, EchoError::Closed)
	}

	fn closed_req_error() -> Self::ReqError {
		"connection closed".to_string()
	}

	fn parse_error_response(err: &Self::LoopError) -> Option<Self::Message> {
		match err {
			EchoError::Malformed(line) => Some(Msg::Err(0, format!("malformed:{line}"))),
			_ => None,
		}
	}
}

struct EchoService {
	notifications: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

impl Service<(u64, String)> for EchoService {
	type Response = String;
	type Error = String;
	type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<String, String>> + Send>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: (u64, String)) -> Self::Future {
		Box::pin(async move {
			if req.1 == "fail" {
				Err("nope".to_string())
			} else {
				Ok(format!("echo:{}", req.1))
			}
		})
	}
}

impl RpcService<EchoProtocol> for EchoService {
	fn notify(&mut self, notif: String) -> ControlFlow<Result<(), EchoError>> {
		self.notifications.lock().unwrap().push(notif);
		ControlFlow::Continue(())
	}
}

#[tokio::test]
async fn request_response_roundtrip() {
	let (client_io, server_io) = tokio::io::duplex(4096);
	let (client_reader, mut client_writer) = tokio::io::split(client_io);
	let mut client_reader = tokio::io::BufReader::new(client_reader);

	let notes = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
	let notes_clone = notes.clone();
	let (main_loop, _socket) = MainLoop::new(
		|_socket| EchoService {
			notifications: notes_clone,
		},
		EchoProtocol,
	);

	let (server_reader, server_writer) = tokio::io::split(server_io);
	let server_reader = tokio::io::BufReader::new(server_reader);
	let server_task = tokio::spawn(main_loop.run(server_reader, server_writer));

	client_writer.write_all(b"req:1:hello\n").await.unwrap();
	let mut line = String::new();
	client_reader.read_line(&mut line).await.unwrap();
	assert_eq!(line, "res:1:echo:hello\n");

	client_writer.write_all(b"req:2:fail\n").await.unwrap();
	let mut line2 = String::new();
	client_reader.read_line(&mut line2).await.unwrap();
	assert_eq!(line2, "err:2:nope\n");

	client_writer.write_all(b"note:hi there\n").await.unwrap();
	// Give the notification a moment to land before we tear the connection
	// down; dropping the writer closes the stream so the server sees EOF.
	tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	drop(client_writer);

	let result = server_task.await.unwrap();
	assert!(result.is_ok());
	assert_eq!(notes.lock().unwrap().as_slice(), ["hi there"]);
}

#[tokio::test]
async fn outbound_request_from_socket_resolves() {
	let (client_io, server_io) = tokio::io::duplex(4096);
	let (client_reader, client_writer) = tokio::io::split(client_io);
	let mut client_reader = tokio::io::BufReader::new(client_reader);
	let mut client_writer = client_writer;

	let (main_loop, socket) = MainLoop::new(
		|_socket| EchoService {
			notifications: Default::default(),
		},
		EchoProtocol,
	);

	let (server_reader, server_writer) = tokio::io::split(server_io);
	let server_reader = tokio::io::BufReader::new(server_reader);
	let _server_task = tokio::spawn(main_loop.run(server_reader, server_writer));

	// The socket issues an outbound request; we answer it from the "client"
	// side of the duplex like a peer would.
	let rx = socket.call((0, "ping".to_string())).unwrap();

	let mut line = String::new();
	client_reader.read_line(&mut line).await.unwrap();
	assert!(line.starts_with("req:1:ping"));

	client_writer.write_all(b"res:1:pong\n").await.unwrap();

	let outcome = rx.await.unwrap();
	assert_eq!(outcome, Ok("pong".to_string()));
}

#[tokio::test]
async fn malformed_line_gets_a_synthetic_error_and_the_loop_keeps_running() {
	let (client_io, server_io) = tokio::io::duplex(4096);
	let (client_reader, mut client_writer) = tokio::io::split(client_io);
	let mut client_reader = tokio::io::BufReader::new(client_reader);

	let (main_loop, _socket) = MainLoop::new(
		|_socket| EchoService {
			notifications: Default::default(),
		},
		EchoProtocol,
	);

	let (server_reader, server_writer) = tokio::io::split(server_io);
	let server_reader = tokio::io::BufReader::new(server_reader);
	let server_task = tokio::spawn(main_loop.run(server_reader, server_writer));

	client_writer.write_all(b"garbage:nope\n").await.unwrap();
	let mut line = String::new();
	client_reader.read_line(&mut line).await.unwrap();
	assert_eq!(line, "err:0:malformed:garbage:nope\n");

	// The loop survived the bad line; a well-formed request still works.
	client_writer.write_all(b"req:1:hello\n").await.unwrap();
	let mut line2 = String::new();
	client_reader.read_line(&mut line2).await.unwrap();
	assert_eq!(line2, "res:1:echo:hello\n");

	drop(client_writer);
	let result = server_task.await.unwrap();
	assert!(result.is_ok());
}
