use crate::core::errors::ExchangeError;
use crate::core::kernel::WsSession;
use crate::exchanges::backpack::codec::BackpackCodec;
use crate::exchanges::backpack::types::OrderUpdate;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of an order-update stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    /// Connected with this many active subscriptions
    Subscribed(usize),
    Closing,
    Closed,
}

/// What to do with a frame that cannot be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodeErrorPolicy {
    /// End the session with `StreamDecodeError`
    #[default]
    Fatal,
    /// Log the frame and keep reading
    Skip,
}

/// Streaming session delivering `OrderUpdate`s to a callback in arrival order
pub struct OrderUpdateStream<W: WsSession<BackpackCodec>> {
    ws: W,
    state: SessionState,
    decode_errors: DecodeErrorPolicy,
}

impl<W: WsSession<BackpackCodec>> OrderUpdateStream<W> {
    pub fn new(ws: W) -> Self {
        Self {
            ws,
            state: SessionState::Disconnected,
            decode_errors: DecodeErrorPolicy::default(),
        }
    }

    pub fn with_decode_error_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_errors = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscription_count(&self) -> usize {
        match self.state {
            SessionState::Subscribed(n) => n,
            _ => 0,
        }
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn connect(&mut self) -> Result<(), ExchangeError> {
        match self.state {
            SessionState::Disconnected | SessionState::Closed => {
                self.ws.connect().await?;
                self.state = SessionState::Connected;
                info!("Order update stream connected");
                Ok(())
            }
            state => Err(ExchangeError::WebSocketError(format!(
                "Cannot connect from state {:?}",
                state
            ))),
        }
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn subscribe(&mut self, stream: &str) -> Result<(), ExchangeError> {
        let active = self.require_open()?;
        self.ws.subscribe(&[stream]).await?;
        self.state = SessionState::Subscribed(active + 1);
        debug!(subscriptions = active + 1, "Subscribed");
        Ok(())
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn unsubscribe(&mut self, stream: &str) -> Result<(), ExchangeError> {
        let active = self.require_open()?;
        self.ws.unsubscribe(&[stream]).await?;
        self.state = match active.saturating_sub(1) {
            0 => SessionState::Connected,
            n => SessionState::Subscribed(n),
        };
        debug!(subscriptions = self.subscription_count(), "Unsubscribed");
        Ok(())
    }

    /// Deliver updates to `callback` until shutdown, server close or a fatal error
    ///
    /// `shutdown` ends the loop once it holds `true` or its sender is dropped.
    /// The socket is closed before returning in every case.
    #[instrument(skip(self, shutdown, callback), fields(exchange = "backpack"))]
    pub async fn run<F>(
        &mut self,
        mut shutdown: watch::Receiver<bool>,
        mut callback: F,
    ) -> Result<(), ExchangeError>
    where
        F: FnMut(OrderUpdate) + Send,
    {
        self.require_open()?;

        let result = loop {
            if *shutdown.borrow() {
                debug!("Shutdown requested");
                break Ok(());
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                        break Ok(());
                    }
                }
                next = self.ws.next_message() => match next {
                    None => {
                        info!("Stream closed by server");
                        break Ok(());
                    }
                    Some(Ok(update)) => callback(update),
                    Some(Err(ExchangeError::StreamDecodeError(reason)))
                        if self.decode_errors == DecodeErrorPolicy::Skip =>
                    {
                        warn!(%reason, "Skipping undecodable frame");
                    }
                    Some(Err(e)) => break Err(e),
                },
            }
        };

        let closed = self.close().await;
        result.and(closed)
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn close(&mut self) -> Result<(), ExchangeError> {
        if matches!(self.state, SessionState::Closed | SessionState::Disconnected) {
            return Ok(());
        }
        self.state = SessionState::Closing;
        let result = self.ws.close().await;
        self.state = SessionState::Closed;
        debug!("Order update stream closed");
        result
    }

    fn require_open(&self) -> Result<usize, ExchangeError> {
        let active = match self.state {
            SessionState::Connected => 0,
            SessionState::Subscribed(n) => n,
            state => {
                return Err(ExchangeError::WebSocketError(format!(
                    "Stream is not connected (state {:?})",
                    state
                )))
            }
        };
        if !self.ws.is_connected() {
            return Err(ExchangeError::NetworkError(
                "WebSocket connection was lost".to_string(),
            ));
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio_tungstenite::tungstenite::Message;

    /// Replays a fixed list of frames; stays open once they run out if `hold_open`
    struct ScriptedWs {
        codec: BackpackCodec,
        inbound: VecDeque<Message>,
        sent: Vec<Message>,
        connected: bool,
        hold_open: bool,
        closed: bool,
    }

    impl ScriptedWs {
        fn new(frames: &[&str], hold_open: bool) -> Self {
            Self {
                codec: BackpackCodec::new(),
                inbound: frames.iter().map(|f| Message::Text((*f).to_string())).collect(),
                sent: Vec::new(),
                connected: false,
                hold_open,
                closed: false,
            }
        }
    }

    #[async_trait]
    impl WsSession<BackpackCodec> for ScriptedWs {
        async fn connect(&mut self) -> Result<(), ExchangeError> {
            self.connected = true;
            Ok(())
        }

        async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
            self.sent.push(msg);
            Ok(())
        }

        async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
            match self.inbound.pop_front() {
                Some(message) => Some(Ok(message)),
                None if self.hold_open => std::future::pending().await,
                None => None,
            }
        }

        async fn close(&mut self) -> Result<(), ExchangeError> {
            self.connected = false;
            self.closed = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn codec(&self) -> &BackpackCodec {
            &self.codec
        }
    }

    async fn connected(ws: ScriptedWs) -> OrderUpdateStream<ScriptedWs> {
        let mut stream = OrderUpdateStream::new(ws);
        stream.connect().await.unwrap();
        stream
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let mut stream = OrderUpdateStream::new(ScriptedWs::new(&[], false));
        assert_eq!(stream.state(), SessionState::Disconnected);
        assert!(stream.subscribe("depth.SOL_USDC").await.is_err());

        stream.connect().await.unwrap();
        assert_eq!(stream.state(), SessionState::Connected);

        stream.subscribe("depth.SOL_USDC").await.unwrap();
        stream.subscribe("account.orderUpdate").await.unwrap();
        assert_eq!(stream.state(), SessionState::Subscribed(2));

        stream.unsubscribe("depth.SOL_USDC").await.unwrap();
        assert_eq!(stream.state(), SessionState::Subscribed(1));
        stream.unsubscribe("account.orderUpdate").await.unwrap();
        assert_eq!(stream.state(), SessionState::Connected);

        stream.close().await.unwrap();
        assert_eq!(stream.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_subscribe_sends_control_frame() {
        let mut stream = connected(ScriptedWs::new(&[], false)).await;
        stream.subscribe("depth.SOL_USDC").await.unwrap();

        assert_eq!(
            stream.ws.sent,
            vec![Message::Text(
                r#"{"method":"SUBSCRIBE","params":["depth.SOL_USDC"]}"#.to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_updates_delivered_in_order() {
        let frames = [
            r#"{"e":"orderAccepted","i":"1","s":"SOL_USDC","X":"New"}"#,
            r#"{"stream":"account.orderUpdate","data":{"e":"orderFill","i":"1","l":"0.5","L":"20"}}"#,
            r#"{"e":"orderFill","i":"1","l":"0.5","L":"21","X":"Filled"}"#,
        ];
        let mut stream = connected(ScriptedWs::new(&frames, false)).await;
        let (_tx, rx) = watch::channel(false);

        let mut received = Vec::new();
        stream.run(rx, |update| received.push(update)).await.unwrap();

        assert_eq!(
            received.iter().map(|u| u.event_type.as_str()).collect::<Vec<_>>(),
            vec!["orderAccepted", "orderFill", "orderFill"]
        );
        assert_eq!(received[1].fill_price.as_deref(), Some("20"));
        assert_eq!(received[2].order_state, "Filled");
        assert_eq!(stream.state(), SessionState::Closed);
        assert!(stream.ws.closed);
    }

    #[tokio::test]
    async fn test_decode_error_is_fatal_by_default() {
        let frames = [r#"{"e":"orderAccepted","i":"1"}"#, "garbage", r#"{"e":"orderFill"}"#];
        let mut stream = connected(ScriptedWs::new(&frames, false)).await;
        let (_tx, rx) = watch::channel(false);

        let mut received = Vec::new();
        let err = stream
            .run(rx, |update| received.push(update))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::StreamDecodeError(_)));
        assert_eq!(received.len(), 1);
        assert_eq!(stream.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_decode_error_skipped_when_configured() {
        let frames = [r#"{"e":"orderAccepted","i":"1"}"#, "garbage", r#"{"e":"orderFill"}"#];
        let mut stream = connected(ScriptedWs::new(&frames, false))
            .await
            .with_decode_error_policy(DecodeErrorPolicy::Skip);
        let (_tx, rx) = watch::channel(false);

        let mut received = Vec::new();
        stream.run(rx, |update| received.push(update)).await.unwrap();

        assert_eq!(received.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_ends_idle_session() {
        let mut stream = connected(ScriptedWs::new(&[r#"{"e":"orderAccepted"}"#], true)).await;
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            tx.send(true).unwrap();
        });

        let mut received = 0;
        stream.run(rx, |_| received += 1).await.unwrap();
        stopper.await.unwrap();

        assert_eq!(received, 1);
        assert_eq!(stream.state(), SessionState::Closed);
        assert!(stream.ws.closed);
    }

    #[tokio::test]
    async fn test_lost_socket_blocks_further_use() {
        let mut stream = connected(ScriptedWs::new(&[], false)).await;
        stream.ws.connected = false;

        assert!(matches!(
            stream.subscribe("depth.SOL_USDC").await,
            Err(ExchangeError::NetworkError(_))
        ));
        let (_tx, rx) = watch::channel(false);
        assert!(stream.run(rx, |_| {}).await.is_err());
    }

    #[tokio::test]
    async fn test_run_requires_connection() {
        let mut stream = OrderUpdateStream::new(ScriptedWs::new(&[], false));
        let (_tx, rx) = watch::channel(false);
        assert!(stream.run(rx, |_| {}).await.is_err());
    }
}
