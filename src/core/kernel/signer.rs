use crate::core::errors::ExchangeError;
use crate::core::kernel::rest::{coerce_param, RequestParams};
use base64::engine::general_purpose;
use base64::Engine;
use ed25519_dalek::{Signer as Ed25519SignerTrait, SigningKey, VerifyingKey};
use std::collections::{BTreeMap, HashMap};

/// Validity window in milliseconds attached to every signed request
pub const DEFAULT_WINDOW_MS: u64 = 10_000;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const WINDOW_HEADER: &str = "X-Window";

/// Result type for signing operations: the header set to attach to the request
pub type SignatureResult = Result<HashMap<String, String>, ExchangeError>;

/// Signer trait for request authentication
///
/// A signer turns an instruction tag and the exact parameters of a request into
/// the authentication headers the exchange expects. Implementations must be
/// deterministic for a fixed timestamp.
pub trait Signer: Send + Sync {
    /// Sign a request at an explicit timestamp
    ///
    /// # Arguments
    /// * `instruction` - Instruction tag naming the operation (e.g. `orderExecute`)
    /// * `params` - The parameters that will be sent with the request
    /// * `timestamp` - Request timestamp in milliseconds
    fn sign_request(
        &self,
        instruction: &str,
        params: &RequestParams,
        timestamp: i64,
    ) -> SignatureResult;

    /// Sign a request at the current time
    fn sign(&self, instruction: &str, params: &RequestParams) -> SignatureResult {
        self.sign_request(instruction, params, current_timestamp_ms())
    }
}

/// Milliseconds since the Unix epoch
pub fn current_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Build the canonical string that gets signed
///
/// `instruction`, every parameter, `timestamp` and `window` are merged into one
/// map, sorted byte-wise by key and joined as `key=value` pairs with `&`.
/// Null parameters are omitted.
pub fn canonical_signing_string(
    instruction: &str,
    params: &RequestParams,
    timestamp: i64,
    window: u64,
) -> String {
    let mut fields: BTreeMap<&str, String> = BTreeMap::new();
    fields.insert("instruction", instruction.to_string());
    for (key, value) in params {
        if let Some(value) = coerce_param(value) {
            fields.insert(key.as_str(), value);
        }
    }
    fields.insert("timestamp", timestamp.to_string());
    fields.insert("window", window.to_string());

    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Ed25519 signer for Backpack
pub struct Ed25519Signer {
    api_key: String,
    signing_key: SigningKey,
    window: u64,
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl Ed25519Signer {
    /// Create a new Ed25519 signer
    ///
    /// # Arguments
    /// * `api_key` - Public API key sent in `X-API-Key`
    /// * `private_key` - Base64-encoded private key: a 32-byte seed, or the
    ///   64-byte seed plus public key form
    pub fn new(api_key: String, private_key: &str) -> Result<Self, ExchangeError> {
        let key_bytes = general_purpose::STANDARD.decode(private_key).map_err(|e| {
            ExchangeError::ConfigurationError(format!("Invalid private key format: {}", e))
        })?;

        let signing_key = match key_bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&key_bytes);
                SigningKey::from_bytes(&seed)
            }
            64 => {
                let mut keypair = [0u8; 64];
                keypair.copy_from_slice(&key_bytes);
                SigningKey::from_keypair_bytes(&keypair).map_err(|e| {
                    ExchangeError::ConfigurationError(format!("Invalid private key: {}", e))
                })?
            }
            len => {
                return Err(ExchangeError::ConfigurationError(format!(
                    "Invalid private key length: expected 32 or 64 bytes, got {}",
                    len
                )))
            }
        };

        Ok(Self {
            api_key,
            signing_key,
            window: DEFAULT_WINDOW_MS,
        })
    }

    /// Public half of the signing key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Validity window in milliseconds
    pub fn window(&self) -> u64 {
        self.window
    }

    fn generate_signature(&self, message: &str) -> String {
        let signature = Ed25519SignerTrait::sign(&self.signing_key, message.as_bytes());
        general_purpose::STANDARD.encode(signature.to_bytes())
    }
}

impl Signer for Ed25519Signer {
    fn sign_request(
        &self,
        instruction: &str,
        params: &RequestParams,
        timestamp: i64,
    ) -> SignatureResult {
        let message = canonical_signing_string(instruction, params, timestamp, self.window);
        let signature = self.generate_signature(&message);

        let mut headers = HashMap::new();
        headers.insert(API_KEY_HEADER.to_string(), self.api_key.clone());
        headers.insert(SIGNATURE_HEADER.to_string(), signature);
        headers.insert(TIMESTAMP_HEADER.to_string(), timestamp.to_string());
        headers.insert(WINDOW_HEADER.to_string(), self.window.to_string());

        Ok(headers)
    }
}
