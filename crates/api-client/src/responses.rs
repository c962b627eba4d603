use rust_decimal::Decimal;
use serde::Deserialize;

// Wire types of the Deriv WebSocket API. Every reply echoes `msg_type` and the
// `req_id` of the request it answers; only the fields we use are modelled.

/// The `error` object carried by a failed reply.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    pub authorize: AuthorizeBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeBody {
    pub loginid: String,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioResponse {
    pub portfolio: Portfolio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Portfolio {
    #[serde(default)]
    pub contracts: Vec<PortfolioContract>,
}

/// One open contract from `{"portfolio": 1}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioContract {
    pub contract_id: u64,
    /// `CALL`, `PUT`, or one of the many non-binary contract types we ignore.
    pub contract_type: String,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub buy_price: Decimal,
    /// Unix seconds.
    pub date_start: i64,
    /// Unix seconds.
    pub expiry_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveSymbolsResponse {
    pub active_symbols: Vec<ActiveSymbol>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActiveSymbol {
    pub symbol: String,
    #[serde(default)]
    pub display_name: String,
    pub exchange_is_open: u8,
    #[serde(default)]
    pub is_trading_suspended: u8,
}

impl ActiveSymbol {
    pub fn is_tradeable(&self) -> bool {
        self.exchange_is_open == 1 && self.is_trading_suspended == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalResponse {
    pub proposal: Proposal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Proposal {
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub ask_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyResponse {
    pub buy: BuyReceipt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyReceipt {
    pub contract_id: u64,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub buy_price: Option<Decimal>,
}
