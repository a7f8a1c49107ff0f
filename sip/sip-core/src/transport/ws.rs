//! WebSocket transport (RFC 7118)
//!
//! Upgraded connections behave like the other streaming transports, except
//! that every text or binary frame carries exactly one SIP message.

use super::managed::DropNotifier;
use super::parse::{parse_complete, CompleteItem};
use super::streaming::{StreamingFactory, StreamingListener, StreamingListenerBuilder};
use super::{Direction, Factory, ReceivedMessage, TpHandle, TpKey, Transport};
use crate::{Endpoint, EndpointBuilder};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use sip_types::uri::UriInfo;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt, io};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_hdr_async, client_async, WebSocketStream};

/// Subprotocol advertised during the upgrade handshake
const SIP_SUBPROTOCOL: &str = "sip";

const IDLE_TIMEOUT: Duration = Duration::from_secs(32);

/// Byte stream a WebSocket transport runs on
pub trait WsInnerStream: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {
    const NAME: &'static str;
    const SECURE: bool;

    fn local_addr(&self) -> io::Result<SocketAddr>;
    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl WsInnerStream for TcpStream {
    const NAME: &'static str = "WS";
    const SECURE: bool = false;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

#[cfg(feature = "tls-rustls")]
impl WsInnerStream for tokio_rustls::TlsStream<TcpStream> {
    const NAME: &'static str = "WSS";
    const SECURE: bool = true;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().0.peer_addr()
    }
}

type WsSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, Message>>>;

struct WsTransport<S: WsInnerStream> {
    bound: SocketAddr,
    remote: SocketAddr,
    incoming: bool,

    sink: WsSink<S>,
}

impl<S: WsInnerStream> fmt::Debug for WsTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("bound", &self.bound)
            .field("remote", &self.remote)
            .field("incoming", &self.incoming)
            .finish()
    }
}

impl<S: WsInnerStream> fmt::Display for WsTransport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:bound={}:remote={}", S::NAME, self.bound, self.remote)
    }
}

#[async_trait::async_trait]
impl<S: WsInnerStream> Transport for WsTransport<S> {
    fn name(&self) -> &'static str {
        S::NAME
    }

    fn secure(&self) -> bool {
        S::SECURE
    }

    fn reliable(&self) -> bool {
        true
    }

    fn bound(&self) -> SocketAddr {
        self.bound
    }

    fn sent_by(&self) -> SocketAddr {
        self.bound
    }

    fn direction(&self) -> Direction {
        if self.incoming {
            Direction::Incoming(self.remote)
        } else {
            Direction::Outgoing(self.remote)
        }
    }

    async fn send(&self, bytes: &[u8], _target: &[SocketAddr]) -> io::Result<()> {
        // one SIP message per text frame
        let message = match std::str::from_utf8(bytes) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(bytes.to_vec().into()),
        };

        let mut sink = self.sink.lock().await;

        sink.send(message).await.map_err(io::Error::other)
    }
}

fn add_subprotocol(_: &Request, mut response: Response) -> Result<Response, ErrorResponse> {
    response
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SIP_SUBPROTOCOL));

    Ok(response)
}

// ==== Listener

/// WebSocket listener, wrapping any streaming listener (plain TCP for `ws`,
/// a TLS acceptor for `wss`)
pub struct WsListener<B> {
    inner: B,
}

impl<B> WsListener<B>
where
    B: StreamingListenerBuilder,
    B::Transport: WsInnerStream,
{
    pub fn new(inner: B) -> Self {
        Self { inner }
    }

    /// Bind to `addr` and accept upgrade requests on it.
    ///
    /// Returns the actually bound address.
    pub async fn spawn<A: ToSocketAddrs + Send>(
        self,
        endpoint: &mut EndpointBuilder,
        addr: A,
    ) -> io::Result<SocketAddr> {
        let (listener, bound) = self.inner.bind(addr).await?;

        log::info!(
            "Accepting {} connections on {}",
            <B::Transport as WsInnerStream>::NAME,
            bound
        );

        tokio::spawn(task_accept(endpoint.subscribe(), listener));

        Ok(bound)
    }
}

async fn task_accept<I>(mut endpoint: broadcast::Receiver<Endpoint>, mut incoming: I)
where
    I: StreamingListener,
    I::Transport: WsInnerStream,
{
    let endpoint = match endpoint.recv().await.ok() {
        Some(endpoint) => endpoint,
        None => return,
    };

    loop {
        match incoming.accept().await {
            Ok((stream, remote)) => {
                let local = match WsInnerStream::local_addr(&stream) {
                    Ok(local) => local,
                    Err(e) => {
                        log::error!("Could not retrieve local addr for incoming stream {}", e);
                        continue;
                    }
                };

                let endpoint = endpoint.clone();

                tokio::spawn(async move {
                    let ws = match accept_hdr_async(stream, add_subprotocol).await {
                        Ok(ws) => ws,
                        Err(e) => {
                            log::warn!("WebSocket handshake with {} failed, {}", remote, e);
                            return;
                        }
                    };

                    log::trace!("WebSocket connection accepted from {} on {}", remote, local);

                    let (sink, stream) = ws.split();
                    let sink = Arc::new(Mutex::new(sink));

                    let transport = WsTransport {
                        bound: local,
                        remote,
                        incoming: true,
                        sink: sink.clone(),
                    };

                    let rx = endpoint.transports().add_managed_unused(transport);

                    receive_task(
                        endpoint,
                        stream,
                        sink,
                        ReceiveTaskState::Unused(Box::pin(sleep(IDLE_TIMEOUT)), rx),
                        local,
                        remote,
                        true,
                    )
                    .await;
                });
            }
            Err(e) => log::error!("Error accepting connection, {}", e),
        }
    }
}

// ==== Connector

/// WebSocket connector, wrapping any streaming connector (plain TCP for
/// `ws`, a TLS connector for `wss`)
pub struct WsConnector<F> {
    inner: F,
}

impl<F> WsConnector<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

#[async_trait::async_trait]
impl<F> Factory for WsConnector<F>
where
    F: StreamingFactory,
    F::Transport: WsInnerStream,
{
    fn name(&self) -> &'static str {
        <F::Transport as WsInnerStream>::NAME
    }

    fn secure(&self) -> bool {
        <F::Transport as WsInnerStream>::SECURE
    }

    async fn create(
        &self,
        endpoint: Endpoint,
        uri_info: &UriInfo<'_>,
        addrs: &[SocketAddr],
    ) -> io::Result<(TpHandle, SocketAddr)> {
        let mut last_err = io::Error::other("empty addrs");

        for &addr in addrs {
            log::trace!("trying to connect to {}", addr);

            let stream = match self.inner.connect(uri_info, addr).await {
                Ok(stream) => stream,
                Err(e) => {
                    last_err = e;
                    continue;
                }
            };

            let local = WsInnerStream::local_addr(&stream)?;
            let remote = WsInnerStream::peer_addr(&stream)?;

            let scheme = if <F::Transport as WsInnerStream>::SECURE {
                "wss"
            } else {
                "ws"
            };

            let mut request = format!("{}://{}:{}/", scheme, uri_info.host_port.host, addr.port())
                .into_client_request()
                .map_err(io::Error::other)?;

            request.headers_mut().insert(
                SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_static(SIP_SUBPROTOCOL),
            );

            let (ws, _response) = match client_async(request, stream).await {
                Ok(ok) => ok,
                Err(e) => {
                    last_err = io::Error::other(e);
                    continue;
                }
            };

            let (sink, stream) = ws.split();
            let sink = Arc::new(Mutex::new(sink));

            let transport = WsTransport {
                bound: local,
                remote,
                incoming: false,
                sink: sink.clone(),
            };

            let (transport, notifier) = endpoint.transports().add_managed_used(transport);

            tokio::spawn(receive_task(
                endpoint.clone(),
                stream,
                sink,
                ReceiveTaskState::InUse(notifier),
                local,
                remote,
                false,
            ));

            return Ok((transport, remote));
        }

        Err(last_err)
    }
}

enum ReceiveTaskState {
    InUse(DropNotifier),
    Unused(Pin<Box<Sleep>>, oneshot::Receiver<DropNotifier>),
}

async fn receive_task<S: WsInnerStream>(
    endpoint: Endpoint,
    mut stream: SplitStream<WebSocketStream<S>>,
    sink: WsSink<S>,
    mut state: ReceiveTaskState,
    local: SocketAddr,
    remote: SocketAddr,
    incoming: bool,
) {
    let tp_key = TpKey {
        name: S::NAME,
        bound: local,
        direction: if incoming {
            Direction::Incoming(remote)
        } else {
            Direction::Outgoing(remote)
        },
    };

    let _drop_guard = UnclaimedGuard {
        endpoint: &endpoint,
        tp_key,
    };

    loop {
        let item = match &mut state {
            ReceiveTaskState::InUse(notifier) => {
                tokio::select! {
                    item = stream.next() => {
                        item
                    }
                    _ = notifier => {
                        log::debug!("all refs to transport dropped, destroying soon if not used");
                        let rx = endpoint.transports().set_unused(&tp_key);
                        state = ReceiveTaskState::Unused(Box::pin(sleep(IDLE_TIMEOUT)), rx);
                        continue;
                    }
                }
            }
            ReceiveTaskState::Unused(timeout, rx) => {
                tokio::select! {
                    item = stream.next() => {
                        item
                    }
                    notifier = rx => {
                        if let Ok(notifier) = notifier {
                            state = ReceiveTaskState::InUse(notifier);

                            continue;
                        } else {
                            log::error!("failed to receive notifier");
                            return;
                        }
                    }
                    _ = timeout => {
                        log::debug!("dropping transport, not used anymore");
                        return;
                    }
                }
            }
        };

        let message = match item {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                log::warn!("An error occurred when reading {} stream, {}", S::NAME, e);
                return;
            }
            None => {
                log::debug!("Connection closed");
                return;
            }
        };

        let payload = match message {
            Message::Text(text) => Vec::from(text.as_bytes()),
            Message::Binary(binary) => Vec::from(&binary[..]),
            Message::Ping(payload) => {
                let mut sink = sink.lock().await;

                if let Err(e) = sink.send(Message::Pong(payload)).await {
                    log::warn!("Failed to answer ping, {}", e);
                    return;
                }

                continue;
            }
            Message::Pong(_) => continue,
            Message::Close(_) => {
                log::debug!("WebSocket connection closed by peer");
                return;
            }
            Message::Frame(_) => continue,
        };

        let transport = endpoint.transports().set_used(&tp_key);

        match parse_complete(&payload) {
            Ok(CompleteItem::KeepAlive) => {
                log::trace!("discarding keep-alive from {}", remote);
            }
            Ok(CompleteItem::Message {
                line,
                headers,
                body,
                buffer,
            }) => {
                let message = ReceivedMessage::new(remote, buffer, transport, line, headers, body);

                endpoint.receive(message);
            }
            Err(e) => {
                // a frame must carry one complete message, close on bad framing
                log::warn!("dropping {} connection to {}, {}", S::NAME, remote, e);
                return;
            }
        }
    }
}

struct UnclaimedGuard<'e> {
    endpoint: &'e Endpoint,
    tp_key: TpKey,
}

impl Drop for UnclaimedGuard<'_> {
    fn drop(&mut self) {
        self.endpoint.transports().drop_transport(&self.tp_key);
    }
}
