use crate::core::errors::ExchangeError;
use tokio_tungstenite::tungstenite::Message;

/// Exchange framing for a WebSocket session
///
/// Outbound, a codec builds the control frames that start and stop streams.
/// Inbound, it turns data frames into typed messages. Ping, pong and close
/// frames are handled by the session and never reach the codec.
pub trait WsCodec: Send + Sync + 'static {
    type Message: Send + Sync;

    /// Frame asking the server to start sending `streams`
    fn encode_subscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError>;

    /// Frame asking the server to stop sending `streams`
    fn encode_unsubscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError>;

    /// `Ok(None)` for frames that carry no message, such as acknowledgements.
    /// Frames that cannot be decoded are `ExchangeError::StreamDecodeError`.
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}
