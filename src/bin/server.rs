//! Unix-domain-socket session acceptor and line-oriented command dispatcher.
//!
//! One OS thread per accepted connection, newline-delimited ASCII request
//! and response framing, grounded in the original reference server's accept
//! loop and the teacher codebase's `network::server::Server` connection
//! handling (adapted here from TCP/bincode framing to a Unix socket and a
//! plain-text line protocol).

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing::{error, info, warn};

use kvtxn::{Engine, EngineConfig, EngineError, TransactionId};

/// In-memory transactional key-value server.
#[derive(Parser, Debug)]
#[command(name = "kvtxn-server", about = "Transactional key-value engine server")]
struct Args {
    /// Unix-domain-socket path to listen on.
    #[arg(long)]
    socket: Option<String>,

    /// Number of key-lock slots.
    #[arg(long)]
    n_slots: Option<usize>,

    /// Maximum concurrently active transactions.
    #[arg(long)]
    max_txns: Option<usize>,
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut config = EngineConfig::default();
    if let Some(socket) = args.socket {
        config = config.with_socket_path(socket);
    }
    if let Some(n_slots) = args.n_slots {
        config = config.with_n_slots(n_slots);
    }
    if let Some(max_txns) = args.max_txns {
        config = config.with_max_txns(max_txns);
    }

    let socket_path = config.socket_path.clone();
    let engine = Engine::shared(config);

    run(engine, &socket_path)
}

fn run(engine: Arc<Engine>, socket_path: &str) -> std::io::Result<()> {
    if fs::metadata(socket_path).is_ok() {
        fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    info!(socket_path, "listening");

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                thread::spawn(move || handle_connection(stream, engine));
            }
            Err(err) => warn!(%err, "failed to accept connection"),
        }
    }

    Ok(())
}

/// Per-connection session: owns at most one open transaction at a time.
/// Read loop runs entirely on this thread; the engine itself never spawns
/// threads.
fn handle_connection(stream: UnixStream, engine: Arc<Engine>) {
    let peer = stream
        .peer_addr()
        .ok()
        .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
        .unwrap_or_else(|| "<unnamed>".to_string());
    info!(peer, "session opened");

    let reader_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to clone session stream");
            return;
        }
    };
    let mut reader = BufReader::new(reader_stream);
    let mut writer = stream;

    let mut session_txn: Option<TransactionId> = None;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(%err, "session read error");
                break;
            }
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            continue;
        }

        let response = dispatch(trimmed, &engine, &mut session_txn);
        if writer.write_all(response.as_bytes()).is_err() || writer.write_all(b"\n").is_err() {
            break;
        }
    }

    // A session that disconnects with an open transaction abandons it; an
    // abandoned transaction still holds locks and wait-edges forever under
    // this protocol, so the dispatcher cleans it up on the way out, the same
    // way the reference server's connection teardown does.
    if let Some(txn_id) = session_txn.take() {
        let _ = engine.abort(txn_id);
    }
    info!(peer, "session closed");
}

/// Parses one request line and executes it against `engine`, formatting the
/// wire response. `session_txn` is the connection's currently open
/// transaction, if any; commands that require one but find none run in
/// autocommit (`begin` + operation + `commit`).
fn dispatch(line: &str, engine: &Engine, session_txn: &mut Option<TransactionId>) -> String {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or("").to_ascii_uppercase();

    match command.as_str() {
        "PING" => "PONG".to_string(),

        "BEGIN" => {
            if session_txn.is_some() {
                return "ERR INVALID".to_string();
            }
            match engine.begin() {
                Ok(id) => {
                    *session_txn = Some(id);
                    format!("OK {id}")
                }
                Err(err) => format_err(&err),
            }
        }

        "COMMIT" => match session_txn.take() {
            None => "ERR INVALID".to_string(),
            Some(id) => match engine.commit(id) {
                Ok(()) => "OK".to_string(),
                Err(err) => format_err(&err),
            },
        },

        "ABORT" => match session_txn.take() {
            None => "ERR INVALID".to_string(),
            Some(id) => match engine.abort(id) {
                Ok(()) => "OK".to_string(),
                Err(err) => format_err(&err),
            },
        },

        "GET" => {
            let Some(key) = parts.next() else {
                return "ERR INVALID".to_string();
            };
            match *session_txn {
                Some(id) => match engine.get(id, key.as_bytes()) {
                    Ok(value) => String::from_utf8_lossy(&value).into_owned(),
                    Err(EngineError::NotFound) => "NOT_FOUND".to_string(),
                    Err(err) => format_err(&err),
                },
                None => match engine.begin() {
                    Ok(id) => match engine.get(id, key.as_bytes()) {
                        Ok(value) => match engine.commit(id) {
                            Ok(()) => String::from_utf8_lossy(&value).into_owned(),
                            Err(err) => format_err(&err),
                        },
                        Err(EngineError::NotFound) => {
                            let _ = engine.abort(id);
                            "NOT_FOUND".to_string()
                        }
                        Err(err) => {
                            let _ = engine.abort(id);
                            format_err(&err)
                        }
                    },
                    Err(err) => format_err(&err),
                },
            }
        }

        "SET" => {
            let Some(key) = parts.next() else {
                return "ERR INVALID".to_string();
            };
            let value = parts.next().unwrap_or("");
            match *session_txn {
                Some(id) => match engine.put(id, key.as_bytes(), value.as_bytes()) {
                    Ok(()) => "OK".to_string(),
                    Err(err) => format_err(&err),
                },
                None => autocommit(
                    engine,
                    |id| engine.put(id, key.as_bytes(), value.as_bytes()),
                    |()| "OK".to_string(),
                ),
            }
        }

        _ => "ERR INVALID".to_string(),
    }
}

/// Wraps a single operation as `begin` + `op` + `commit` for a session with
/// no open transaction. On failure at any stage the partially-open
/// transaction (if one was begun) is aborted before the error is reported;
/// the deadlock detector's decision is never retried here, per the
/// propagation policy — retry is a client concern.
fn autocommit<T>(
    engine: &Engine,
    op: impl FnOnce(TransactionId) -> kvtxn::EngineResult<T>,
    format_ok: impl FnOnce(T) -> String,
) -> String {
    let id = match engine.begin() {
        Ok(id) => id,
        Err(err) => return format_err(&err),
    };

    match op(id) {
        Ok(value) => match engine.commit(id) {
            Ok(()) => format_ok(value),
            Err(err) => format_err(&err),
        },
        Err(err) => {
            let _ = engine.abort(id);
            format_err(&err)
        }
    }
}

fn format_err(err: &EngineError) -> String {
    format!("ERR {}", err.wire_tag())
}
