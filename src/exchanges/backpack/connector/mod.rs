use crate::core::kernel::RestClient;
use crate::exchanges::backpack::rest::BackpackRestClient;

pub mod account;
pub mod market_data;
pub mod trading;

pub use account::Account;
pub use market_data::MarketData;
pub use trading::{CancelAllOutcome, CancelAllPolicy, Trading, MAX_CANCEL_ALL_ATTEMPTS};

/// Backpack connector that composes the market data, account and trading facades
///
/// All three share one REST client and, when credentials were configured, one
/// signer.
pub struct BackpackConnector<R: RestClient> {
    pub market: MarketData<R>,
    pub trading: Trading<R>,
    pub account: Account<R>,
}

impl<R: RestClient + Clone> BackpackConnector<R> {
    pub fn new(rest: BackpackRestClient<R>) -> Self {
        Self {
            market: MarketData::new(&rest),
            trading: Trading::new(&rest),
            account: Account::new(&rest),
        }
    }

    /// Replace the cancel-all retry policy
    pub fn with_cancel_all_policy(mut self, policy: CancelAllPolicy) -> Self {
        self.trading = self.trading.with_cancel_all_policy(policy);
        self
    }

    /// Whether authenticated operations can be called
    pub fn can_sign(&self) -> bool {
        self.account.can_sign()
    }
}
