use crate::core::{errors::ExchangeError, kernel::RequestParams, kernel::RestClient};
use crate::exchanges::backpack::rest::{to_params, BackpackRestClient};
use crate::exchanges::backpack::types::{
    Balances, Deposit, DepositAddress, Fill, FillHistoryParams, OrderHistoryEntry,
    OrderHistoryParams, PageParams, Withdrawal, WithdrawalRequest,
};
use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

const CAPITAL: &str = "/api/v1/capital";
const DEPOSITS: &str = "/wapi/v1/capital/deposits";
const DEPOSIT_ADDRESS: &str = "/wapi/v1/capital/deposit/address";
const WITHDRAWALS: &str = "/wapi/v1/capital/withdrawals";
const ORDER_HISTORY: &str = "/wapi/v1/history/orders";
const FILL_HISTORY: &str = "/wapi/v1/history/fills";

/// Capital and history endpoints; every call is signed
pub struct Account<R: RestClient> {
    rest: BackpackRestClient<R>,
}

impl<R: RestClient + Clone> Account<R> {
    pub fn new(rest: &BackpackRestClient<R>) -> Self {
        Self { rest: rest.clone() }
    }
}

impl<R: RestClient> Account<R> {
    pub fn can_sign(&self) -> bool {
        self.rest.has_signer()
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_balances(&self) -> Result<Balances, ExchangeError> {
        self.rest
            .signed(Method::GET, CAPITAL, "balanceQuery", &RequestParams::new())
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_deposits(&self, page: &PageParams) -> Result<Vec<Deposit>, ExchangeError> {
        self.rest
            .signed(Method::GET, DEPOSITS, "depositQueryAll", &to_params(page)?)
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_deposit_address(
        &self,
        blockchain: &str,
    ) -> Result<DepositAddress, ExchangeError> {
        let mut params = RequestParams::new();
        params.insert(
            "blockchain".to_string(),
            Value::String(blockchain.to_string()),
        );
        self.rest
            .signed(Method::GET, DEPOSIT_ADDRESS, "depositAddressQuery", &params)
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_withdrawals(
        &self,
        page: &PageParams,
    ) -> Result<Vec<Withdrawal>, ExchangeError> {
        self.rest
            .signed(Method::GET, WITHDRAWALS, "withdrawalQueryAll", &to_params(page)?)
            .await
    }

    #[instrument(skip(self, request), fields(exchange = "backpack", symbol = %request.symbol, blockchain = %request.blockchain))]
    pub async fn request_withdrawal(
        &self,
        request: &WithdrawalRequest,
    ) -> Result<Withdrawal, ExchangeError> {
        self.rest
            .signed(Method::POST, WITHDRAWALS, "withdraw", &to_params(request)?)
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_order_history(
        &self,
        params: &OrderHistoryParams,
    ) -> Result<Vec<OrderHistoryEntry>, ExchangeError> {
        self.rest
            .signed(
                Method::GET,
                ORDER_HISTORY,
                "orderHistoryQueryAll",
                &to_params(params)?,
            )
            .await
    }

    #[instrument(skip(self), fields(exchange = "backpack"))]
    pub async fn get_fill_history(
        &self,
        params: &FillHistoryParams,
    ) -> Result<Vec<Fill>, ExchangeError> {
        self.rest
            .signed(
                Method::GET,
                FILL_HISTORY,
                "fillHistoryQueryAll",
                &to_params(params)?,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::{canonical_signing_string, DEFAULT_WINDOW_MS};
    use crate::exchanges::backpack::connector::stub::{fail_envelope, test_signer, StubRest};
    use base64::Engine;
    use ed25519_dalek::{Signature, Verifier};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::Arc;

    fn account(stub: &StubRest) -> Account<StubRest> {
        Account::new(&BackpackRestClient::with_signer(stub.clone(), test_signer()))
    }

    #[tokio::test]
    async fn test_balances_signed_with_balance_query() {
        let stub = StubRest::always(json!({
            "SOL": {"available": "10", "locked": "1", "staked": "0"},
            "USDC": {"available": "250.5", "locked": "0", "staked": "0"}
        }));
        let balances = account(&stub).get_balances().await.unwrap();

        assert_eq!(balances["SOL"].total(), Decimal::from(11));

        let call = stub.last_call();
        assert_eq!(call.method, Method::GET);
        assert_eq!(call.endpoint, "/api/v1/capital");
        assert_eq!(call.headers["X-API-Key"], "test-api-key");
        assert_eq!(call.headers["X-Window"], "10000");
    }

    #[tokio::test]
    async fn test_signature_covers_sent_params() {
        let stub = StubRest::always(json!([]));
        let signer = test_signer();
        let account = Account::new(&BackpackRestClient::with_signer(
            stub.clone(),
            Arc::clone(&signer),
        ));
        account
            .get_deposits(&PageParams {
                limit: Some(50),
                offset: Some(100),
            })
            .await
            .unwrap();

        let call = stub.last_call();
        assert_eq!(call.params["limit"], 50);
        assert_eq!(call.params["offset"], 100);

        let timestamp: i64 = call.headers["X-Timestamp"].parse().unwrap();
        let message =
            canonical_signing_string("depositQueryAll", &call.params, timestamp, DEFAULT_WINDOW_MS);
        assert!(message.contains("limit=50&offset=100"));

        let seed = [7u8; 32];
        let verifying_key = ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key();
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&call.headers["X-Signature"])
            .unwrap();
        let signature = Signature::from_slice(&raw).unwrap();
        assert!(verifying_key.verify(message.as_bytes(), &signature).is_ok());
    }

    #[tokio::test]
    async fn test_withdrawal_is_posted() {
        let stub = StubRest::always(json!({
            "id": 9, "blockchain": "Solana", "quantity": "1.5", "fee": "0.01",
            "symbol": "SOL", "status": "pending", "toAddress": "addr",
            "createdAt": "2024-01-01T00:00:00"
        }));
        let withdrawal = account(&stub)
            .request_withdrawal(&WithdrawalRequest {
                address: "addr".to_string(),
                blockchain: "Solana".to_string(),
                client_id: None,
                quantity: Decimal::new(15, 1),
                symbol: "SOL".to_string(),
                two_factor_token: None,
            })
            .await
            .unwrap();

        assert_eq!(withdrawal.id, 9);
        let call = stub.last_call();
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.endpoint, "/wapi/v1/capital/withdrawals");
        assert_eq!(call.params["quantity"], "1.5");
    }

    #[tokio::test]
    async fn test_history_endpoints() {
        let stub = StubRest::always(json!([]));
        let account = account(&stub);

        account
            .get_order_history(&OrderHistoryParams {
                symbol: Some("SOL_USDC".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stub.last_call().endpoint, "/wapi/v1/history/orders");

        account
            .get_fill_history(&FillHistoryParams::default())
            .await
            .unwrap();
        let call = stub.last_call();
        assert_eq!(call.endpoint, "/wapi/v1/history/fills");
        assert!(call.params.is_empty());
    }

    #[tokio::test]
    async fn test_missing_signer_is_auth_error() {
        let stub = StubRest::always(json!({}));
        let account = Account::new(&BackpackRestClient::new(stub.clone()));

        let err = account.get_balances().await.unwrap_err();
        assert!(matches!(err, ExchangeError::AuthError(_)));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_envelope_is_not_success() {
        let stub = StubRest::new(|_, _| fail_envelope());
        let err = account(&stub).get_deposit_address("Solana").await.unwrap_err();

        assert!(err.is_application_failure());
        assert_eq!(stub.last_call().params["blockchain"], "Solana");
    }
}
