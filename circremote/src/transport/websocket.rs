// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Web Workflow transport (`/cp/serial/` WebSocket console).
//!
//! A background thread owns the socket. It performs the handshake, reports the outcome
//! to the caller, then loops: forward queued outgoing frames, read one inbound frame,
//! hand it to the registered callback. Frames that arrive before a callback exists are
//! kept and replayed, in order, when one is registered.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, trace, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::client::Request;
use tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{HandshakeError, Message, WebSocket};

use circremote_common::protocol::WEBSOCKET_CONNECT_TIMEOUT;
use circremote_common::target::console_url;

use super::{MessageHandler, Transport, TransportKind};
use crate::error::TransportError;

/// How long one socket read may block before outgoing frames get a turn.
const READ_SLICE: Duration = Duration::from_millis(50);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

enum Outgoing {
    Text(String),
    Handler(MessageHandler),
    Close,
}

/// WebSocket console connection.
pub struct WebSocketTransport {
    url: String,
    outgoing: Option<Sender<Outgoing>>,
    worker: Option<JoinHandle<()>>,
}

/// `Authorization` value for the Web Workflow password (empty user name).
pub fn basic_auth(password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!(":{}", password)))
}

fn build_request(url: &str, password: Option<&str>) -> Result<Request, TransportError> {
    let mut request = url.into_client_request()?;
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        let value = HeaderValue::from_str(&basic_auth(password))
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        debug!("added basic auth header");
    }
    Ok(request)
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| TransportError::WebSocket(format!("cannot resolve {}:{}", host, port)))
}

/// TCP connect plus WebSocket handshake, all bounded by the connect timeout.
fn open_socket(addr: SocketAddr, request: Request) -> Result<Socket, TransportError> {
    let stream = TcpStream::connect_timeout(&addr, WEBSOCKET_CONNECT_TIMEOUT)
        .map_err(TransportError::from_connect_io)?;
    stream.set_read_timeout(Some(WEBSOCKET_CONNECT_TIMEOUT))?;
    stream.set_write_timeout(Some(WEBSOCKET_CONNECT_TIMEOUT))?;
    stream.set_nodelay(true)?;
    // Socket options are shared between clones; keep one to shorten reads later.
    let control = stream.try_clone()?;

    let (socket, response) = match tungstenite::client_tls_with_config(request, stream, None, None)
    {
        Ok(done) => done,
        Err(HandshakeError::Failure(err)) => return Err(err.into()),
        Err(HandshakeError::Interrupted(_)) => return Err(TransportError::ConnectionTimeout),
    };
    debug!(status = %response.status(), "WebSocket handshake complete");

    control.set_read_timeout(Some(READ_SLICE))?;
    Ok(socket)
}

impl WebSocketTransport {
    /// Connect to the console at `host:port`.
    ///
    /// Blocks for at most five seconds waiting for the background thread to report
    /// either an open connection or an error.
    pub fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self, TransportError> {
        let url = console_url(host, port);
        debug!(%url, "connecting to Web Workflow console");

        let request = build_request(&url, password)?;
        let addr = resolve(host, port)?;

        let (signal_tx, signal_rx) = mpsc::channel::<Result<(), TransportError>>();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outgoing>();

        let worker = thread::Builder::new()
            .name("websocket".to_string())
            .spawn(move || {
                let socket = match open_socket(addr, request) {
                    Ok(socket) => socket,
                    Err(err) => {
                        debug!(error = %err, "WebSocket connection error");
                        let _ = signal_tx.send(Err(err));
                        return;
                    }
                };
                // The caller may have stopped waiting already.
                if signal_tx.send(Ok(())).is_err() {
                    return;
                }
                deliver(socket, outgoing_rx);
            })?;

        match signal_rx.recv_timeout(WEBSOCKET_CONNECT_TIMEOUT) {
            Ok(Ok(())) => {
                debug!(%url, "WebSocket connection established");
                Ok(Self {
                    url,
                    outgoing: Some(outgoing_tx),
                    worker: Some(worker),
                })
            }
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(RecvTimeoutError::Timeout) => Err(TransportError::ConnectionTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::WebSocket(
                "connection thread exited".to_string(),
            )),
        }
    }

    fn queue(&self, item: Outgoing) -> Result<(), TransportError> {
        self.outgoing
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(item)
            .map_err(|_| TransportError::Closed)
    }
}

/// Delivery loop run on the background thread until close or disconnect.
fn deliver(mut socket: Socket, outgoing: Receiver<Outgoing>) {
    let mut handler: Option<MessageHandler> = None;
    let mut backlog: Vec<String> = Vec::new();
    let mut frames = 0usize;

    loop {
        loop {
            match outgoing.try_recv() {
                Ok(Outgoing::Text(text)) => {
                    if let Err(err) = socket.send(Message::text(text)) {
                        warn!(error = %err, "WebSocket send failed");
                        return;
                    }
                }
                Ok(Outgoing::Handler(mut registered)) => {
                    for frame in backlog.drain(..) {
                        registered(frame);
                    }
                    handler = Some(registered);
                }
                Ok(Outgoing::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    debug!(frames, "WebSocket delivery loop stopped");
                    return;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "WebSocket closed by device");
                continue;
            }
            Ok(_) => continue,
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                debug!(frames, "WebSocket connection closed");
                return;
            }
            Err(err) => {
                warn!(error = %err, "WebSocket error");
                return;
            }
        };

        frames += 1;
        trace!(frames, data = ?text, "WebSocket frame received");
        match handler.as_mut() {
            Some(handler) => handler(text),
            None => backlog.push(text),
        }
    }
}

impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn write(&mut self, text: &str) -> Result<(), TransportError> {
        debug!("sending {} byte frame", text.len());
        self.queue(Outgoing::Text(text.to_string()))
    }

    fn flush(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        let Some(outgoing) = self.outgoing.take() else {
            return;
        };
        let _ = outgoing.send(Outgoing::Close);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("WebSocket delivery thread panicked");
            }
        }
        debug!(url = %self.url, "WebSocket connection closed");
    }

    fn on_message(&mut self, handler: MessageHandler) -> Result<(), TransportError> {
        self.queue(Outgoing::Handler(handler))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}
