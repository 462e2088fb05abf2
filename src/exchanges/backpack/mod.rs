pub mod builder;
pub mod codec;
pub mod connector;
pub mod rest;
pub mod stream;
pub mod types;

// Re-export main types for easier importing
pub use builder::{build_connector, build_order_update_stream, build_rest_client};
pub use codec::BackpackCodec;
pub use connector::{
    Account, BackpackConnector, CancelAllOutcome, CancelAllPolicy, MarketData, Trading,
};
pub use rest::BackpackRestClient;
pub use stream::{DecodeErrorPolicy, OrderUpdateStream, SessionState};
pub use types::*;
