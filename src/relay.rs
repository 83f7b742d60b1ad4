//! Single-relay session: connect, send one message, collect replies until the
//! relay signals the exchange is over.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use tokio_socks::tcp::Socks5Stream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{client_async_tls, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::{Error, Result},
    query::{ClientMessage, SubscriptionId},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    AwaitingResponse,
    Closing,
    Closed,
}

/// What the transport should do after an inbound frame.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    /// `CLOSE` message to send before hanging up.
    pub close: Option<ClientMessage>,
    pub disconnect: bool,
}

/// Protocol state and reply buffer of one exchange, independent of the
/// socket.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    close_id: SubscriptionId,
    responses: Vec<Value>,
}

impl Session {
    pub fn new(msg: &ClientMessage) -> Self {
        Self {
            state: SessionState::Connecting,
            close_id: msg.close_id(),
            responses: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn responses(&self) -> &[Value] {
        &self.responses
    }

    pub fn into_responses(self) -> Vec<Value> {
        self.responses
    }

    /// Handshake finished.
    pub fn opened(&mut self) {
        self.transition(SessionState::Open);
    }

    /// Outbound message written.
    pub fn sent(&mut self) {
        self.transition(SessionState::AwaitingResponse);
    }

    /// Connection gone, by either side or by the deadline.
    pub fn closed(&mut self) {
        self.transition(SessionState::Closed);
    }

    /// Feed one text frame from the relay.
    pub fn on_message(&mut self, frame: &str) -> Step {
        let value = match serde_json::from_str::<Value>(frame) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "skipping non-json frame");
                return Step::default();
            }
        };
        let Some(verb) = value
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            warn!(%frame, "skipping frame that is not a relay message");
            return Step::default();
        };
        trace!(%verb, sub = self.close_id.as_str(), "relay message");

        if matches!(verb.as_str(), "EVENT" | "OK" | "NOTICE") {
            self.responses.push(value);
        }
        let mut step = Step::default();
        if matches!(verb.as_str(), "OK" | "NOTICE" | "EOSE") {
            step.close = Some(ClientMessage::Close(self.close_id.clone()));
            self.transition(SessionState::Closing);
        }
        if matches!(verb.as_str(), "OK" | "NOTICE" | "EOSE" | "CLOSED") {
            step.disconnect = true;
            self.transition(SessionState::Closed);
        }
        step
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }
}

/// A failed exchange along with whatever the relay sent before it failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionError {
    pub error: Error,
    pub responses: Vec<Value>,
}

impl From<Error> for SessionError {
    fn from(error: Error) -> Self {
        Self {
            error,
            responses: Vec::new(),
        }
    }
}

/// Build the websocket endpoint for a relay host. Values that already carry
/// a `ws://` or `wss://` scheme are used as given.
pub fn endpoint(relay: &str) -> Result<Url> {
    let relay = relay.trim();
    if relay.is_empty() {
        return Err(Error::InvalidRelay("no relay host given".into()));
    }
    let candidate = if relay.starts_with("ws://") || relay.starts_with("wss://") {
        relay.to_string()
    } else {
        format!("wss://{relay}")
    };
    let url = Url::parse(&candidate).map_err(|e| Error::InvalidRelay(format!("{relay}: {e}")))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(Error::InvalidRelay(format!("{relay}: missing host"))),
    }
}

/// Connection settings for one relay.
#[derive(Debug, Clone)]
pub struct RelaySession {
    endpoint: Url,
    proxy: Option<String>,
    timeout: Duration,
}

impl RelaySession {
    pub fn new(relay: &str) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint(relay)?,
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Route the connection through a SOCKS5 proxy (`host:port`).
    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `msg` and collect the relay's replies in arrival order.
    pub async fn exchange(
        &self,
        msg: &ClientMessage,
    ) -> std::result::Result<Vec<Value>, SessionError> {
        let mut session = Session::new(msg);
        let deadline = Instant::now() + self.timeout;
        let result = tokio::select! {
            r = self.drive(msg, &mut session) => r,
            _ = sleep_until(deadline) => Err(Error::Timeout(self.timeout)),
        };
        session.closed();
        match result {
            Ok(()) => Ok(session.into_responses()),
            Err(error) => {
                warn!(relay = %self.endpoint, %error, "relay exchange failed");
                Err(SessionError {
                    error,
                    responses: session.into_responses(),
                })
            }
        }
    }

    async fn drive(&self, msg: &ClientMessage, session: &mut Session) -> Result<()> {
        let mut ws = connect_ws(&self.endpoint, self.proxy.as_deref()).await?;
        session.opened();
        let out = msg.to_json()?;
        debug!(relay = %self.endpoint, verb = msg.verb(), "sending");
        ws.send(Message::Text(out)).await?;
        session.sent();

        while let Some(frame) = ws.next().await {
            match frame? {
                Message::Text(txt) => {
                    let step = session.on_message(&txt);
                    if let Some(close) = step.close {
                        ws.send(Message::Text(close.to_json()?)).await?;
                    }
                    if step.disconnect {
                        if let Err(e) = ws.close(None).await {
                            debug!(error = %e, "close handshake failed");
                        }
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        debug!(
            state = ?session.state(),
            buffered = session.responses().len(),
            "relay exchange finished"
        );
        Ok(())
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<Box<dyn AsyncReadWrite + Unpin + Send>>>;

/// Establish a WebSocket connection, optionally via a SOCKS5 proxy.
async fn connect_ws(url: &Url, proxy: Option<&str>) -> Result<WsStream> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidRelay(format!("{url}: missing host")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| Error::InvalidRelay(format!("{url}: missing port")))?;
    let req = url.as_str().into_client_request()?;
    let stream: Box<dyn AsyncReadWrite + Unpin + Send> = if let Some(proxy) = proxy {
        debug!(%proxy, "connecting through socks5");
        Box::new(Socks5Stream::connect(proxy, (host, port)).await?)
    } else {
        Box::new(
            TcpStream::connect((host, port))
                .await
                .map_err(|e| Error::Network(format!("{host}:{port}: {e}")))?,
        )
    };
    let (ws, _) = client_async_tls(req, stream).await?;
    Ok(ws)
}

/// Blanket trait for boxed async read/write streams.
trait AsyncReadWrite: AsyncRead + AsyncWrite {}
impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}
