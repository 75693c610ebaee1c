// Websocket transport for the live channel.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use strata_common::protocol::live::{ClientFrame, EventFrame};

use super::LiveTransport;

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Default)]
pub struct WsTransport {
    socket: Option<ClientSocket>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn socket(&mut self) -> Result<&mut ClientSocket> {
        self.socket.as_mut().ok_or_else(|| anyhow!("live socket is not connected"))
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").field("open", &self.is_open()).finish()
    }
}

impl LiveTransport for WsTransport {
    async fn connect(&mut self, endpoint: &Url, token: &str) -> Result<()> {
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid live endpoint `{endpoint}`"))?;
        if !token.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("token is not a valid header value")?;
            request.headers_mut().insert(AUTHORIZATION, bearer);
        }

        let (socket, response) = connect_async(request)
            .await
            .with_context(|| format!("websocket handshake with {endpoint} failed"))?;
        debug!(status = response.status().as_u16(), "live socket open");
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        let payload = serde_json::to_string(frame).context("failed to encode client frame")?;
        self.socket()?.send(WsFrame::Text(payload.into())).await.context("websocket send failed")
    }

    async fn recv(&mut self) -> Result<Option<EventFrame>> {
        loop {
            let Some(message) = self.socket()?.next().await else {
                self.socket = None;
                return Ok(None);
            };
            let payload = match message.context("websocket receive failed")? {
                WsFrame::Text(text) => text.as_bytes().to_vec(),
                WsFrame::Binary(bytes) => bytes.to_vec(),
                WsFrame::Close(_) => {
                    self.socket = None;
                    return Ok(None);
                }
                // tungstenite answers pings itself.
                WsFrame::Ping(_) | WsFrame::Pong(_) | WsFrame::Frame(_) => continue,
            };
            match serde_json::from_slice::<EventFrame>(&payload) {
                Ok(frame) => return Ok(Some(frame)),
                Err(error) => {
                    warn!(error = %error, bytes = payload.len(), "skipping undecodable live frame");
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(error) = socket.close(None).await {
                debug!(error = %error, "live socket close failed");
            }
        }
    }
}
