//! A minimal language server for a toy `.note` format: plain text files
//! where each non-blank line is one note. Exists to exercise `lsp-endpoint`
//! end to end, not as a useful editor plugin.

use std::collections::HashMap;
use std::sync::Mutex;

use clap::Parser;
use lsp_endpoint::transport::{StdioTransport, TcpTransport};
use lsp_endpoint::Connection;
use lsp_types::{CompletionItem, CompletionItemKind, InitializeResult, ServerCapabilities, TextDocumentSyncKind};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "note-server", about = "Example language server for .note files")]
struct Cli {
    /// Speak LSP over stdin/stdout (the default transport editors expect).
    #[arg(long)]
    stdio: bool,

    /// Listen on 127.0.0.1:<PORT> and speak LSP over the first connection
    /// accepted, instead of stdio.
    #[arg(long, value_name = "PORT")]
    tcp: Option<u16>,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// All server-side state for one connection. Explicit and per-connection,
/// never a module-level global, so nothing stops two connections (e.g. in
/// tests) from running in the same process.
struct NoteServer {
    documents: Mutex<HashMap<String, String>>,
}

impl NoteServer {
    fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
        }
    }

    fn notes_in(text: &str) -> Vec<String> {
        text.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect()
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(format!("note_server={level}")))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let server = std::sync::Arc::new(NoteServer::new());
    let connection = Connection::new();

    connection.on_request("initialize", |_params, _cancel| async move {
        let result = InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(lsp_types::CompletionOptions::default()),
                ..Default::default()
            },
            server_info: Some(lsp_types::ServerInfo {
                name: "note-server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            ..Default::default()
        };
        serde_json::to_value(result).map_err(|e| {
            lsp_endpoint::ResponseError::new(lsp_endpoint::ErrorCode::InternalError, e.to_string())
        })
    });

    {
        let server = server.clone();
        connection.on_notification("textDocument/didOpen", move |params| {
            let server = server.clone();
            async move {
                if let Some((uri, text)) = doc_open_payload(&params) {
                    tracing::info!(%uri, notes = NoteServer::notes_in(&text).len(), "document opened");
                    server.documents.lock().unwrap().insert(uri, text);
                }
            }
        });
    }

    {
        let server = server.clone();
        connection.on_notification("textDocument/didChange", move |params| {
            let server = server.clone();
            async move {
                if let Some((uri, text)) = doc_change_payload(&params) {
                    server.documents.lock().unwrap().insert(uri, text);
                }
            }
        });
    }

    {
        let server = server.clone();
        connection.on_notification("textDocument/didClose", move |params| {
            let server = server.clone();
            async move {
                if let Some(uri) = params.as_ref().and_then(|p| p["textDocument"]["uri"].as_str()) {
                    server.documents.lock().unwrap().remove(uri);
                }
            }
        });
    }

    {
        let server = server.clone();
        connection.on_request("textDocument/completion", move |params, _cancel| {
            let server = server.clone();
            async move {
                let uri = params
                    .as_ref()
                    .and_then(|p| p["textDocument"]["uri"].as_str())
                    .unwrap_or_default();
                let items: Vec<CompletionItem> = server
                    .documents
                    .lock()
                    .unwrap()
                    .get(uri)
                    .map(|text| NoteServer::notes_in(text))
                    .unwrap_or_default()
                    .into_iter()
                    .map(|note| CompletionItem {
                        label: note,
                        kind: Some(CompletionItemKind::TEXT),
                        ..Default::default()
                    })
                    .collect();
                serde_json::to_value(items).map_err(|e| {
                    lsp_endpoint::ResponseError::new(lsp_endpoint::ErrorCode::InternalError, e.to_string())
                })
            }
        });
    }

    connection.on_request("shutdown", |_params, _cancel| async move { Ok(Value::Null) });

    match cli.tcp {
        Some(port) if !cli.stdio => {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
            tracing::info!(%port, "listening for an editor connection");
            let (stream, peer) = listener.accept().await?;
            tracing::info!(%peer, "accepted connection");
            connection.run(TcpTransport::from_stream(stream)).await?;
        }
        _ => {
            connection.run(StdioTransport::new()).await?;
        }
    }

    Ok(())
}

fn doc_open_payload(params: &Option<Value>) -> Option<(String, String)> {
    let params = params.as_ref()?;
    let uri = params["textDocument"]["uri"].as_str()?.to_string();
    let text = params["textDocument"]["text"].as_str()?.to_string();
    Some((uri, text))
}

fn doc_change_payload(params: &Option<Value>) -> Option<(String, String)> {
    let params = params.as_ref()?;
    let uri = params["textDocument"]["uri"].as_str()?.to_string();
    let text = params["contentChanges"].as_array()?.last()?["text"].as_str()?.to_string();
    Some((uri, text))
}
