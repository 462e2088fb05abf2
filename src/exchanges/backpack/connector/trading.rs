use crate::core::{errors::ExchangeError, kernel::RestClient};
use crate::exchanges::backpack::rest::{symbol_params, to_params, BackpackRestClient};
use crate::exchanges::backpack::types::{CancelOrder, CreateOrder, Order, OrderQuery};
use reqwest::Method;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{instrument, warn};

const ORDER: &str = "/api/v1/order";
const ORDERS: &str = "/api/v1/orders";

/// Upper bound on cancel-all sends: the initial attempt plus three retries
pub const MAX_CANCEL_ALL_ATTEMPTS: u32 = 4;

/// Pacing for cancel-all retries
#[derive(Debug, Clone, Default)]
pub struct CancelAllPolicy {
    delay: Duration,
}

impl CancelAllPolicy {
    /// Wait `delay` between attempts
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Result of a cancel-all call that reached the exchange
#[derive(Debug, Clone)]
pub enum CancelAllOutcome {
    /// The exchange accepted the cancellation and returned the affected orders
    Cancelled(Vec<Order>),
    /// Every attempt was rejected; whether orders remain open is unknown
    Exhausted { attempts: u32 },
}

impl CancelAllOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Treat exhaustion as an error
    pub fn into_result(self) -> Result<Vec<Order>, ExchangeError> {
        match self {
            Self::Cancelled(orders) => Ok(orders),
            Self::Exhausted { attempts } => Err(ExchangeError::RetryExhausted { attempts }),
        }
    }
}

/// Order placement, lookup and cancellation
pub struct Trading<R: RestClient> {
    rest: BackpackRestClient<R>,
    cancel_all: CancelAllPolicy,
}

impl<R: RestClient + Clone> Trading<R> {
    pub fn new(rest: &BackpackRestClient<R>) -> Self {
        Self {
            rest: rest.clone(),
            cancel_all: CancelAllPolicy::default(),
        }
    }
}

impl<R: RestClient> Trading<R> {
    pub fn with_cancel_all_policy(mut self, policy: CancelAllPolicy) -> Self {
        self.cancel_all = policy;
        self
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_open_order(&self, query: &OrderQuery) -> Result<Order, ExchangeError> {
        require_order_identity(query)?;
        self.rest
            .signed(Method::GET, ORDER, "orderQuery", &to_params(query)?)
            .await
    }

    #[instrument(skip(self, order), fields(exchange = "backpack", symbol = %order.symbol, side = ?order.side))]
    pub async fn create_order(&self, order: &CreateOrder) -> Result<Order, ExchangeError> {
        self.rest
            .signed(Method::POST, ORDER, "orderExecute", &to_params(order)?)
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        self.rest
            .signed(Method::GET, ORDERS, "orderQueryAll", &symbol_params(symbol))
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn cancel_order(&self, cancel: &CancelOrder) -> Result<Order, ExchangeError> {
        require_order_identity(cancel)?;
        self.rest
            .signed(Method::DELETE, ORDER, "orderCancel", &to_params(cancel)?)
            .await
    }

    /// Cancel every open order on `symbol`
    ///
    /// The request is signed once and the identical request is resent while
    /// the exchange rejects it, up to `MAX_CANCEL_ALL_ATTEMPTS` sends. Running
    /// out of attempts yields `CancelAllOutcome::Exhausted`, not an error.
    /// Transport failures are returned immediately without retrying.
    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn cancel_all_orders(&self, symbol: &str) -> Result<CancelAllOutcome, ExchangeError> {
        let params = symbol_params(symbol);
        let headers = self.rest.sign("orderCancelAll", &params)?;

        let attempts = AtomicU32::new(0);
        let strategy = FixedInterval::new(self.cancel_all.delay())
            .take((MAX_CANCEL_ALL_ATTEMPTS - 1) as usize);

        let (rest, params, headers, counter) = (&self.rest, &params, &headers, &attempts);
        let result = RetryIf::spawn(
            strategy,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                rest.send::<Vec<Order>>(Method::DELETE, ORDERS, params, headers)
                    .await
            },
            |e: &ExchangeError| {
                let retry = e.is_application_failure();
                if retry {
                    warn!(
                        attempt = counter.load(Ordering::SeqCst),
                        error = %e,
                        "Cancel-all rejected by exchange"
                    );
                }
                retry
            },
        )
        .await;

        match result {
            Ok(orders) => Ok(CancelAllOutcome::Cancelled(orders)),
            Err(e) if e.is_application_failure() => Ok(CancelAllOutcome::Exhausted {
                attempts: attempts.load(Ordering::SeqCst),
            }),
            Err(e) => Err(e),
        }
    }
}

/// The exchange needs an order id or a client id to locate one order
fn require_order_identity(query: &OrderQuery) -> Result<(), ExchangeError> {
    if query.order_id.is_none() && query.client_id.is_none() {
        return Err(ExchangeError::InvalidParameters(format!(
            "order on {} needs an order id or a client id",
            query.symbol
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanges::backpack::connector::stub::{fail_envelope, test_signer, StubRest};
    use crate::exchanges::backpack::types::Side;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};

    fn order_json(id: &str, status: &str) -> Value {
        json!({
            "id": id, "orderType": "Limit", "symbol": "SOL_USDC", "side": "Bid",
            "price": "20", "quantity": "1", "executedQuantity": "0",
            "status": status, "createdAt": 1_700_000_000_000_i64
        })
    }

    fn trading(stub: &StubRest) -> Trading<StubRest> {
        Trading::new(&BackpackRestClient::with_signer(stub.clone(), test_signer()))
    }

    #[tokio::test]
    async fn test_create_order_posts_signed_body() {
        let stub = StubRest::always(order_json("111", "New"));
        let order = CreateOrder::limit("SOL_USDC", Side::Bid, Decimal::from(20), Decimal::ONE)
            .with_client_id(7);

        let placed = trading(&stub).create_order(&order).await.unwrap();

        assert_eq!(placed.id, "111");
        assert_eq!(placed.side, Side::Bid);
        let call = stub.last_call();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.endpoint, "/api/v1/order");
        assert_eq!(call.params["clientId"], 7);
        assert!(call.headers.contains_key("X-Signature"));
    }

    #[tokio::test]
    async fn test_order_lookup_and_cancel_paths() {
        let stub = StubRest::new(|call, _| {
            if call.endpoint == "/api/v1/orders" {
                Ok(json!([order_json("1", "New")]))
            } else {
                Ok(order_json("1", "Cancelled"))
            }
        });
        let trading = trading(&stub);
        let query = OrderQuery {
            symbol: "SOL_USDC".to_string(),
            order_id: Some("1".to_string()),
            client_id: None,
        };

        trading.get_open_order(&query).await.unwrap();
        trading.get_open_orders("SOL_USDC").await.unwrap();
        let cancelled = trading.cancel_order(&query).await.unwrap();

        assert_eq!(cancelled.status, "Cancelled");
        let calls = stub.calls();
        assert_eq!(
            calls
                .iter()
                .map(|c| (c.method.clone(), c.endpoint.as_str()))
                .collect::<Vec<_>>(),
            vec![
                (Method::GET, "/api/v1/order"),
                (Method::GET, "/api/v1/orders"),
                (Method::DELETE, "/api/v1/order"),
            ]
        );
    }

    #[tokio::test]
    async fn test_order_without_identity_is_rejected_locally() {
        let stub = StubRest::always(order_json("1", "Cancelled"));
        let trading = trading(&stub);
        let query = OrderQuery {
            symbol: "SOL_USDC".to_string(),
            order_id: None,
            client_id: None,
        };

        assert!(matches!(
            trading.get_open_order(&query).await,
            Err(ExchangeError::InvalidParameters(_))
        ));
        assert!(matches!(
            trading.cancel_order(&query).await,
            Err(ExchangeError::InvalidParameters(_))
        ));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_exhausts_after_four_attempts() {
        let stub = StubRest::new(|_, _| fail_envelope());
        let outcome = trading(&stub).cancel_all_orders("SOL_USDC").await.unwrap();

        assert!(matches!(outcome, CancelAllOutcome::Exhausted { attempts: 4 }));
        assert_eq!(stub.calls().len(), 4);
        assert!(matches!(
            outcome.into_result(),
            Err(ExchangeError::RetryExhausted { attempts: 4 })
        ));
    }

    #[tokio::test]
    async fn test_cancel_all_resends_identical_request() {
        let stub = StubRest::new(|_, _| fail_envelope());
        trading(&stub).cancel_all_orders("SOL_USDC").await.unwrap();

        let calls = stub.calls();
        for call in &calls {
            assert_eq!(call.method, Method::DELETE);
            assert_eq!(call.endpoint, "/api/v1/orders");
            assert_eq!(call.params, calls[0].params);
            assert_eq!(call.headers, calls[0].headers);
        }
    }

    #[tokio::test]
    async fn test_cancel_all_stops_on_first_success() {
        let stub = StubRest::new(|_, index| {
            if index == 0 {
                fail_envelope()
            } else {
                Ok(json!([order_json("1", "Cancelled"), order_json("2", "Cancelled")]))
            }
        });
        let outcome = trading(&stub).cancel_all_orders("SOL_USDC").await.unwrap();

        assert_eq!(stub.calls().len(), 2);
        match outcome {
            CancelAllOutcome::Cancelled(orders) => assert_eq!(orders.len(), 2),
            other => panic!("Expected Cancelled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_all_transport_error_not_retried() {
        let stub = StubRest::new(|_, _| {
            Err(ExchangeError::NetworkError("connection reset".to_string()))
        });
        let err = trading(&stub).cancel_all_orders("SOL_USDC").await.unwrap_err();

        assert!(err.is_transport_failure());
        assert_eq!(stub.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_requires_signer() {
        let stub = StubRest::always(json!([]));
        let trading = Trading::new(&BackpackRestClient::new(stub.clone()));

        let err = trading.cancel_all_orders("SOL_USDC").await.unwrap_err();
        assert!(matches!(err, ExchangeError::AuthError(_)));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_delay_is_applied() {
        let stub = StubRest::new(|_, _| fail_envelope());
        let trading = trading(&stub)
            .with_cancel_all_policy(CancelAllPolicy::with_delay(Duration::from_millis(20)));

        let started = std::time::Instant::now();
        let outcome = trading.cancel_all_orders("SOL_USDC").await.unwrap();

        assert_eq!(trading.cancel_all.delay(), Duration::from_millis(20));
        assert!(!outcome.is_cancelled());
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
