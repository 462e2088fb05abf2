use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{instrument, trace};

/// Flat request parameters, sent as query pairs (GET) or a JSON body (POST/DELETE)
pub type RequestParams = Map<String, Value>;

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Value of the `status` field marking an exchange-level failure
pub const FAILURE_STATUS: &str = "fail";

/// String form of a parameter value, as used for query strings and signing
///
/// Strings are used verbatim, numbers and booleans in their canonical text
/// form, and anything else as compact JSON. `null` yields `None`.
pub fn coerce_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// HTTP transport seam
///
/// Signing happens above this layer; callers pass the headers a `Signer`
/// produced. Exchange rejections surface as `ExchangeError::ApiError`. Connect
/// failures are `NetworkError`, deadlines `ConnectionTimeout`, and any other
/// reqwest failure (such as a truncated body) `HttpError`.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Send `params` to `endpoint` and return the decoded body
    ///
    /// GET puts `params` in the query string; POST and DELETE send them as a
    /// JSON body.
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ExchangeError>;

    async fn get(
        &self,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ExchangeError> {
        self.execute(Method::GET, endpoint, params, headers).await
    }

    async fn post(
        &self,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ExchangeError> {
        self.execute(Method::POST, endpoint, params, headers).await
    }

    async fn delete(
        &self,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ExchangeError> {
        self.execute(Method::DELETE, endpoint, params, headers).await
    }
}

/// Transport settings for one exchange
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Scheme and host, endpoints are appended verbatim
    pub base_url: String,
    /// Recorded on every request span
    pub exchange_name: String,
    /// Upper bound on a whole request, connect to last body byte
    pub timeout: Duration,
    pub user_agent: String,
}

impl RestClientConfig {
    /// Defaults: 6 second timeout, crate user agent
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout: Duration::from_secs(6),
            user_agent: concat!("backpack-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

}

pub struct RestClientBuilder {
    config: RestClientConfig,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self { config }
    }

    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("HTTP client setup failed: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
        })
    }
}

/// `RestClient` over a pooled reqwest client
#[derive(Clone, Debug)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
}

impl ReqwestRest {
    pub fn new(base_url: String, exchange_name: String) -> Result<Self, ExchangeError> {
        RestClientBuilder::new(RestClientConfig::new(base_url, exchange_name)).build()
    }

    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    fn url_for(&self, endpoint: &str) -> String {
        let mut url = String::with_capacity(self.config.base_url.len() + endpoint.len());
        url.push_str(self.config.base_url.trim_end_matches('/'));
        url.push_str(endpoint);
        url
    }

    fn transport_error(&self, error: reqwest::Error) -> ExchangeError {
        if error.is_timeout() {
            ExchangeError::ConnectionTimeout(format!(
                "{} request timed out after {:?}",
                self.config.exchange_name, self.config.timeout
            ))
        } else if error.is_connect() {
            ExchangeError::NetworkError(format!("Request failed: {}", error))
        } else {
            ExchangeError::HttpError(error)
        }
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params, headers), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: &RequestParams,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ExchangeError> {
        let url = self.url_for(endpoint);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON);

        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if method == Method::GET {
            let query: Vec<(&str, String)> = params
                .iter()
                .filter_map(|(k, v)| coerce_param(v).map(|v| (k.as_str(), v)))
                .collect();
            if !query.is_empty() {
                request = request.query(&query);
            }
        } else if !params.is_empty() {
            let body = serde_json::to_vec(params).map_err(|e| {
                ExchangeError::SerializationError(format!(
                    "Failed to serialize request body: {}",
                    e
                ))
            })?;
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        trace!(%status, "Response body: {}", body);

        interpret_response(status, &body)
    }
}

/// Turn a raw HTTP response into decoded JSON or an exchange failure
///
/// HTTP success does not imply exchange success: a body carrying
/// `"status": "fail"` is reported as `ApiError` regardless of the status code.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<Value, ExchangeError> {
    let trimmed = body.trim();
    let parsed: Option<Value> = if trimmed.is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str(trimmed).ok()
    };

    if !status.is_success() {
        let (code, message) = parsed
            .as_ref()
            .map(failure_details)
            .unwrap_or((None, None));
        return Err(ExchangeError::ApiError {
            code: code.unwrap_or_else(|| status.as_u16().to_string()),
            message: message.unwrap_or_else(|| trimmed.to_string()),
        });
    }

    match parsed {
        Some(value) if is_failure_envelope(&value) => {
            let (code, message) = failure_details(&value);
            Err(ExchangeError::ApiError {
                code: code.unwrap_or_else(|| FAILURE_STATUS.to_string()),
                message: message.unwrap_or_else(|| value.to_string()),
            })
        }
        Some(value) => Ok(value),
        // Plain-text success bodies such as `pong`
        None => Ok(Value::String(trimmed.to_string())),
    }
}

/// Whether a decoded body is the exchange's failure envelope
pub fn is_failure_envelope(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some(FAILURE_STATUS)
}

fn failure_details(value: &Value) -> (Option<String>, Option<String>) {
    let code = value.get("code").and_then(|c| match c {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    });
    let message = value
        .get("message")
        .or_else(|| value.get("msg"))
        .and_then(Value::as_str)
        .map(str::to_string);
    (code, message)
}
