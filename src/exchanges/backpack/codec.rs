use crate::core::errors::ExchangeError;
use crate::core::kernel::WsCodec;
use crate::exchanges::backpack::types::{ControlFrame, OrderUpdate, StreamEnvelope};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Backpack WebSocket codec: control frames out, order updates in
#[derive(Debug, Clone, Copy, Default)]
pub struct BackpackCodec;

impl BackpackCodec {
    pub fn new() -> Self {
        Self
    }

    fn control_frame(
        method: &'static str,
        streams: &[impl AsRef<str>],
    ) -> Result<Message, ExchangeError> {
        let frame = ControlFrame {
            method,
            params: streams.iter().map(|s| s.as_ref().to_string()).collect(),
        };
        serde_json::to_string(&frame)
            .map(Message::Text)
            .map_err(|e| ExchangeError::SerializationError(e.to_string()))
    }

    /// Decode one text payload, unwrapping the `{"stream", "data"}` envelope
    pub fn decode_text(&self, text: &str) -> Result<Option<OrderUpdate>, ExchangeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| ExchangeError::StreamDecodeError(format!("invalid JSON: {}", e)))?;

        let Value::Object(map) = &value else {
            return Err(ExchangeError::StreamDecodeError(format!(
                "expected a JSON object, got {}",
                value
            )));
        };

        if let Some(error) = map.get("error") {
            return Err(ExchangeError::WebSocketError(format!(
                "stream error: {}",
                error
            )));
        }

        // Acknowledgements of control frames carry no event
        if map.contains_key("result") && !map.contains_key("data") && !map.contains_key("e") {
            debug!(frame = %text, "Control acknowledgement");
            return Ok(None);
        }

        let payload = if map.contains_key("stream") && map.contains_key("data") {
            let envelope: StreamEnvelope = serde_json::from_value(value)
                .map_err(|e| ExchangeError::StreamDecodeError(format!("bad envelope: {}", e)))?;
            envelope.data
        } else {
            value
        };

        serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| ExchangeError::StreamDecodeError(format!("bad order update: {}", e)))
    }
}

impl WsCodec for BackpackCodec {
    type Message = OrderUpdate;

    fn encode_subscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError> {
        Self::control_frame("SUBSCRIBE", streams)
    }

    fn encode_unsubscription(
        &self,
        streams: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Message, ExchangeError> {
        Self::control_frame("UNSUBSCRIBE", streams)
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        match message {
            Message::Text(text) => self.decode_text(&text),
            Message::Binary(bytes) => {
                let text = std::str::from_utf8(&bytes).map_err(|e| {
                    ExchangeError::StreamDecodeError(format!("binary frame is not UTF-8: {}", e))
                })?;
                self.decode_text(text)
            }
            _ => Ok(None),
        }
    }
}
