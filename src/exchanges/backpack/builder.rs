use crate::core::{
    config::ExchangeConfig,
    errors::ExchangeError,
    kernel::{Ed25519Signer, ReqwestRest, RestClientBuilder, RestClientConfig, TungsteniteWs},
};
use crate::exchanges::backpack::{
    codec::BackpackCodec, connector::BackpackConnector, rest::BackpackRestClient,
    stream::OrderUpdateStream,
};
use std::sync::Arc;

pub const BASE_URL: &str = "https://api.backpack.exchange";
pub const WS_URL: &str = "wss://ws.backpack.exchange";
pub const EXCHANGE_NAME: &str = "backpack";

/// Create the Backpack REST client, signed when the config carries credentials
///
/// A config with only one of `api_key` and `secret_key` is rejected.
pub fn build_rest_client(
    config: &ExchangeConfig,
) -> Result<BackpackRestClient<ReqwestRest>, ExchangeError> {
    let rest_config = RestClientConfig::new(
        config
            .base_url
            .clone()
            .unwrap_or_else(|| BASE_URL.to_string()),
        EXCHANGE_NAME.to_string(),
    );
    let rest = RestClientBuilder::new(rest_config).build()?;

    if config.api_key().is_empty() != config.secret_key().is_empty() {
        return Err(ExchangeError::ConfigurationError(
            "api_key and secret_key must be set together".to_string(),
        ));
    }

    if config.has_credentials() {
        let signer = Ed25519Signer::new(config.api_key().to_string(), config.secret_key())?;
        Ok(BackpackRestClient::with_signer(rest, Arc::new(signer)))
    } else {
        Ok(BackpackRestClient::new(rest))
    }
}

/// Create a Backpack connector with market data, account and trading facades
pub fn build_connector(
    config: ExchangeConfig,
) -> Result<BackpackConnector<ReqwestRest>, ExchangeError> {
    Ok(BackpackConnector::new(build_rest_client(&config)?))
}

/// Create an unconnected order-update stream
pub fn build_order_update_stream(
    config: &ExchangeConfig,
) -> OrderUpdateStream<TungsteniteWs<BackpackCodec>> {
    let ws_url = config.ws_url.clone().unwrap_or_else(|| WS_URL.to_string());
    let ws = TungsteniteWs::new(ws_url, EXCHANGE_NAME.to_string(), BackpackCodec::new());
    OrderUpdateStream::new(ws)
}
