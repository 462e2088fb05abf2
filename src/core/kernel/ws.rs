use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::WsCodec;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, instrument};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Deadlines applied by `TungsteniteWs`
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub connect_timeout: Duration,
    /// Applies to each outbound frame; a send that misses it fails the session
    pub write_timeout: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(3),
        }
    }
}

/// A WebSocket connection paired with the codec that frames it
///
/// Implementors supply the raw socket operations. Subscription control frames
/// and typed decoding are derived from them through `codec()`.
#[async_trait]
pub trait WsSession<C: WsCodec>: Send + Sync {
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    /// Write one frame
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError>;

    /// Next data frame; `None` once the peer has closed cleanly
    ///
    /// A connection lost earlier, for instance by a failed write, yields an error.
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>>;

    async fn close(&mut self) -> Result<(), ExchangeError>;

    fn is_connected(&self) -> bool;

    fn codec(&self) -> &C;

    async fn subscribe<S>(&mut self, streams: &[S]) -> Result<(), ExchangeError>
    where
        S: AsRef<str> + Send + Sync,
    {
        if streams.is_empty() {
            return Ok(());
        }
        let frame = self.codec().encode_subscription(streams)?;
        self.send_raw(frame).await
    }

    async fn unsubscribe<S>(&mut self, streams: &[S]) -> Result<(), ExchangeError>
    where
        S: AsRef<str> + Send + Sync,
    {
        if streams.is_empty() {
            return Ok(());
        }
        let frame = self.codec().encode_unsubscription(streams)?;
        self.send_raw(frame).await
    }

    /// Next frame the codec turns into a message, skipping the ones it ignores
    async fn next_message(&mut self) -> Option<Result<C::Message, ExchangeError>> {
        loop {
            let raw = match self.next_raw().await? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            if let Some(decoded) = self.codec().decode_message(raw).transpose() {
                return Some(decoded);
            }
        }
    }
}

/// `WsSession` over tokio-tungstenite
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    exchange_name: String,
    codec: C,
    config: WsConfig,
    sink: Option<SplitSink<WsStream, Message>>,
    source: Option<SplitStream<WsStream>>,
}

impl<C: WsCodec> TungsteniteWs<C> {
    pub fn new(url: String, exchange_name: String, codec: C) -> Self {
        Self {
            url,
            exchange_name,
            codec,
            config: WsConfig::default(),
            sink: None,
            source: None,
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    fn drop_connection(&mut self) {
        self.sink = None;
        self.source = None;
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    #[instrument(skip(self), fields(exchange = %self.exchange_name, url = %self.url))]
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        let (stream, _) = timeout(self.config.connect_timeout, connect_async(&self.url))
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout(format!(
                    "WebSocket handshake exceeded {:?}",
                    self.config.connect_timeout
                ))
            })?
            .map_err(|e| {
                ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e))
            })?;

        let (sink, source) = stream.split();
        self.sink = Some(sink);
        self.source = Some(source);
        debug!("WebSocket connected");
        Ok(())
    }

    #[instrument(skip(self, msg), fields(exchange = %self.exchange_name))]
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        let deadline = self.config.write_timeout;
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| ExchangeError::NetworkError("WebSocket not connected".to_string()))?;

        let error = match timeout(deadline, sink.send(msg)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => ExchangeError::NetworkError(format!("WebSocket send failed: {}", e)),
            Err(_) => ExchangeError::ConnectionTimeout(format!(
                "WebSocket write exceeded {:?}",
                deadline
            )),
        };
        self.drop_connection();
        Err(error)
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        loop {
            let Some(source) = self.source.as_mut() else {
                return Some(Err(ExchangeError::NetworkError(
                    "WebSocket not connected".to_string(),
                )));
            };

            match source.next().await {
                // tungstenite queues the pong and flushes it on the next read or write
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by peer");
                    self.drop_connection();
                    return None;
                }
                Some(Ok(message)) => return Some(Ok(message)),
                Some(Err(e)) => {
                    self.drop_connection();
                    return Some(Err(ExchangeError::WebSocketError(e.to_string())));
                }
                None => {
                    self.drop_connection();
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    async fn close(&mut self) -> Result<(), ExchangeError> {
        if let Some(sink) = self.sink.as_mut() {
            // Best effort: the peer may already be gone
            let _ = timeout(self.config.write_timeout, sink.send(Message::Close(None))).await;
        }
        self.drop_connection();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.sink.is_some()
    }

    fn codec(&self) -> &C {
        &self.codec
    }
}
