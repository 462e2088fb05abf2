use crate::core::{errors::ExchangeError, kernel::RequestParams, kernel::RestClient};
use crate::exchanges::backpack::rest::{symbol_params, to_params, BackpackRestClient};
use crate::exchanges::backpack::types::{
    Asset, Depth, HistoricalTradesParams, Kline, KlineParams, Market, SystemStatus, Ticker, Trade,
};
use serde_json::Value;
use tracing::instrument;

/// Public market data endpoints; none of these need credentials
pub struct MarketData<R: RestClient> {
    rest: BackpackRestClient<R>,
}

impl<R: RestClient + Clone> MarketData<R> {
    pub fn new(rest: &BackpackRestClient<R>) -> Self {
        Self { rest: rest.clone() }
    }
}

impl<R: RestClient> MarketData<R> {
    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_status(&self) -> Result<SystemStatus, ExchangeError> {
        self.rest
            .public_get("/api/v1/status", &RequestParams::new())
            .await
    }

    /// Liveness check; the exchange answers `pong`
    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn ping(&self) -> Result<String, ExchangeError> {
        self.rest.public_get("/api/v1/ping", &RequestParams::new()).await
    }

    /// Exchange clock in milliseconds
    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_system_time(&self) -> Result<i64, ExchangeError> {
        let value: Value = self
            .rest
            .public_get("/api/v1/time", &RequestParams::new())
            .await?;
        match &value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            ExchangeError::DeserializationError(format!("/api/v1/time: unexpected body {}", value))
        })
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_assets(&self) -> Result<Vec<Asset>, ExchangeError> {
        self.rest
            .public_get("/api/v1/assets", &RequestParams::new())
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
        self.rest
            .public_get("/api/v1/markets", &RequestParams::new())
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.rest
            .public_get("/api/v1/ticker", &symbol_params(symbol))
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_tickers(&self) -> Result<Vec<Ticker>, ExchangeError> {
        self.rest
            .public_get("/api/v1/tickers", &RequestParams::new())
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_depth(&self, symbol: &str) -> Result<Depth, ExchangeError> {
        self.rest
            .public_get("/api/v1/depth", &symbol_params(symbol))
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_klines(&self, params: &KlineParams) -> Result<Vec<Kline>, ExchangeError> {
        self.rest
            .public_get("/api/v1/klines", &to_params(params)?)
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Trade>, ExchangeError> {
        let mut params = symbol_params(symbol);
        if let Some(limit) = limit {
            params.insert("limit".to_string(), Value::from(limit));
        }
        self.rest.public_get("/api/v1/trades", &params).await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_historical_trades(
        &self,
        params: &HistoricalTradesParams,
    ) -> Result<Vec<Trade>, ExchangeError> {
        self.rest
            .public_get("/api/v1/trades/history", &to_params(params)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::backpack::connector::stub::{fail_envelope, StubRest};
    use reqwest::Method;
    use serde_json::json;

    fn market(stub: &StubRest) -> MarketData<StubRest> {
        MarketData::new(&BackpackRestClient::new(stub.clone()))
    }

    #[tokio::test]
    async fn test_public_calls_are_unsigned() {
        let stub = StubRest::always(json!({"status": "Ok", "message": null}));
        let status = market(&stub).get_status().await.unwrap();

        assert_eq!(status.status, "Ok");
        let call = stub.last_call();
        assert_eq!(call.method, Method::GET);
        assert_eq!(call.endpoint, "/api/v1/status");
        assert!(call.headers.is_empty());
    }

    #[tokio::test]
    async fn test_ping_and_time() {
        let stub = StubRest::new(|call, _| match call.endpoint.as_str() {
            "/api/v1/ping" => Ok(json!("pong")),
            _ => Ok(json!(1_700_000_000_123_i64)),
        });
        let market = market(&stub);

        assert_eq!(market.ping().await.unwrap(), "pong");
        assert_eq!(market.get_system_time().await.unwrap(), 1_700_000_000_123);
    }

    #[tokio::test]
    async fn test_ticker_sends_symbol() {
        let stub = StubRest::always(json!({
            "symbol": "SOL_USDC", "firstPrice": "20", "lastPrice": "21",
            "priceChange": "1", "priceChangePercent": "0.05", "high": "22",
            "low": "19", "volume": "1000", "quoteVolume": "20500", "trades": "42"
        }));
        let ticker = market(&stub).get_ticker("SOL_USDC").await.unwrap();

        assert_eq!(ticker.symbol, "SOL_USDC");
        assert_eq!(ticker.trades, "42");
        assert_eq!(stub.last_call().params["symbol"], "SOL_USDC");
    }

    #[tokio::test]
    async fn test_historical_trades_sends_limit_and_offset() {
        let stub = StubRest::always(json!([]));
        market(&stub)
            .get_historical_trades(&HistoricalTradesParams {
                symbol: "SOL_USDC".to_string(),
                limit: Some(100),
                offset: Some(200),
            })
            .await
            .unwrap();

        let call = stub.last_call();
        assert_eq!(call.endpoint, "/api/v1/trades/history");
        assert_eq!(call.params["limit"], 100);
        assert_eq!(call.params["offset"], 200);
    }

    #[tokio::test]
    async fn test_recent_trades_without_limit() {
        let stub = StubRest::always(json!([{
            "id": 1, "price": "21.5", "quantity": "2", "quoteQuantity": "43",
            "timestamp": 1_700_000_000_000_i64, "isBuyerMaker": false
        }]));
        let trades = market(&stub).get_recent_trades("SOL_USDC", None).await.unwrap();

        assert_eq!(trades.len(), 1);
        assert!(!stub.last_call().params.contains_key("limit"));
    }

    #[tokio::test]
    async fn test_failure_envelope_propagates() {
        let stub = StubRest::new(|_, _| fail_envelope());
        let err = market(&stub).get_markets().await.unwrap_err();
        assert!(err.is_application_failure());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_deserialization_error() {
        let stub = StubRest::always(json!({"unexpected": true}));
        let err = market(&stub).get_markets().await.unwrap_err();
        assert!(matches!(err, ExchangeError::DeserializationError(_)));
    }
}
