//! Transport kernel: request signing and the REST and WebSocket transports
//!
//! The kernel holds no endpoint knowledge. Exchange modules compose it:
//!
//! ## Transport Layer
//! - `RestClient`: HTTP request execution and failure discrimination
//! - `WsSession`: WebSocket connection management with a write deadline
//!
//! ## Authentication
//! - `Signer`: Pluggable authentication interface
//! - `Ed25519Signer`: instruction-tagged Ed25519 signatures
//!
//! ## Message Handling
//! - `WsCodec`: Exchange-specific message encoding/decoding
//!
//! # Example
//! ```rust,no_run
//! use backpack_client::core::kernel::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rest = ReqwestRest::new(
//!     "https://api.backpack.exchange".to_string(),
//!     "backpack".to_string(),
//! )?;
//! let signer = Ed25519Signer::new("api-key".to_string(), "c2VjcmV0LXNlZWQtb2YtMzItYnl0ZXMtbG9uZyEhISE=")?;
//!
//! let params = RequestParams::new();
//! let headers = signer.sign("balanceQuery", &params)?;
//! let balances = rest.get("/api/v1/capital", &params, &headers).await?;
//! println!("{}", balances);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::WsCodec;
pub use rest::{
    coerce_param, interpret_response, ReqwestRest, RequestParams, RestClient, RestClientBuilder,
    RestClientConfig,
};
pub use signer::{
    canonical_signing_string, current_timestamp_ms, Ed25519Signer, SignatureResult, Signer,
    DEFAULT_WINDOW_MS,
};
pub use ws::{TungsteniteWs, WsConfig, WsSession};
