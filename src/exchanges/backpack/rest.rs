use crate::core::errors::ExchangeError;
use crate::core::kernel::{RequestParams, RestClient, SignatureResult, Signer};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Flatten a parameter object into request params
///
/// The object must serialize to a JSON map; absent optional fields are
/// expected to be skipped by the type itself.
pub fn to_params<T: Serialize>(value: &T) -> Result<RequestParams, ExchangeError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ExchangeError::SerializationError(format!(
            "Request parameters must be an object, got {}",
            other
        ))),
        Err(e) => Err(ExchangeError::SerializationError(e.to_string())),
    }
}

/// Params holding only `symbol`
pub fn symbol_params(symbol: &str) -> RequestParams {
    let mut params = RequestParams::new();
    params.insert("symbol".to_string(), Value::String(symbol.to_string()));
    params
}

/// Thin typed wrapper around `RestClient` for Backpack API
///
/// Public endpoints go out unsigned. Authenticated endpoints are signed with
/// the instruction tag and the exact params that are sent.
pub struct BackpackRestClient<R: RestClient> {
    client: R,
    signer: Option<Arc<dyn Signer>>,
}

impl<R: RestClient> BackpackRestClient<R> {
    pub fn new(client: R) -> Self {
        Self {
            client,
            signer: None,
        }
    }

    pub fn with_signer(client: R, signer: Arc<dyn Signer>) -> Self {
        Self {
            client,
            signer: Some(signer),
        }
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    pub fn inner(&self) -> &R {
        &self.client
    }

    /// Produce the signature headers for one authenticated request
    pub fn sign(&self, instruction: &str, params: &RequestParams) -> SignatureResult {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError(format!(
                "Credentials required for instruction '{}'",
                instruction
            ))
        })?;
        signer.sign(instruction, params)
    }

    /// GET a public endpoint and decode the body
    pub async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &RequestParams,
    ) -> Result<T, ExchangeError> {
        let value = self.client.get(endpoint, params, &HashMap::new()).await?;
        decode(endpoint, value)
    }

    /// Sign and send an authenticated request, then decode the body
    pub async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        instruction: &str,
        params: &RequestParams,
    ) -> Result<T, ExchangeError> {
        let headers = self.sign(instruction, params)?;
        self.send(method, endpoint, params, &headers).await
    }

    /// Send an already-signed request
    ///
    /// Used where the same signed request may go out more than once.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<T, ExchangeError> {
        let value = self.client.execute(method, endpoint, params, headers).await?;
        decode(endpoint, value)
    }
}

impl<R: RestClient + Clone> Clone for BackpackRestClient<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            signer: self.signer.clone(),
        }
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T, ExchangeError> {
    serde_json::from_value(value).map_err(|e| {
        trace!(endpoint, "Response did not match expected shape");
        ExchangeError::DeserializationError(format!("{}: {}", endpoint, e))
    })
}
