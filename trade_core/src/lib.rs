pub mod block_range;
pub mod chain;
pub mod classifier;
pub mod grouping;
pub mod normalize;
pub mod progress;
pub mod rate_limiter;
pub mod sources;
pub mod transfer;
pub mod valuation;

pub use block_range::{format_cursor, next_cursor, parse_cursor, BlockRange, SAFETY_MARGIN_BLOCKS};
pub use chain::EvmChain;
pub use classifier::{classify_direction, DirectionRule, LegView, SwapClassifier, DIRECTION_RULES};
pub use grouping::{group_swap_candidates, GroupingOutcome, GroupingStats, TransferGroup};
pub use normalize::normalize_amount;
pub use progress::{CycleStage, NoopProgress, ProgressSink, ProgressUpdate, SharedProgress, TracingProgress};
pub use rate_limiter::RateLimiter;
pub use sources::{ChainTipSource, CursorStore, NativePriceSource, TradeStore, TransferSource};
pub use transfer::{RawTransfer, TransferDirection, TransferIdentity, ValidatedTransfer};
pub use valuation::{classify_counter, is_stablecoin, CounterAsset, UsdValuation, ValuationOutcome};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwapError {
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),
    #[error("Normalization error: {0}")]
    Normalization(String),
    #[error("Upstream source error: {0}")]
    Source(String),
    #[error("Price lookup error: {0}")]
    PriceLookup(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),
}

pub type Result<T> = std::result::Result<T, SwapError>;

/// Null/burn address. Also used as the token address of a chain's native asset.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Direction of a reconstructed swap from the wallet's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    /// Wallet acquired the display token
    Buy,
    /// Wallet disposed of the display token
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    pub normalized_amount: Decimal,
}

/// Normalized output record for one reconstructed swap.
///
/// Unique per `(wallet_address, chain, tx_hash)`; storing the same transaction
/// again replaces every derived field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTrade {
    pub wallet_address: String,
    pub chain: EvmChain,
    pub tx_hash: String,
    pub tx_index: Option<u32>,
    pub direction: TradeDirection,
    /// Leg received by the wallet
    pub token_in: TradeLeg,
    /// Leg paid by the wallet
    pub token_out: TradeLeg,
    /// Counter amount per display token
    pub price: Option<Decimal>,
    pub native_price_usd: Option<Decimal>,
    pub usd_price_per_token: Option<Decimal>,
    pub usd_value: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    /// Every transfer of the transaction plus classification notes
    pub raw_payload: serde_json::Value,
}

impl CanonicalTrade {
    /// The token presented as traded: acquired on BUY, disposed of on SELL
    pub fn display_leg(&self) -> &TradeLeg {
        match self.direction {
            TradeDirection::Buy => &self.token_in,
            TradeDirection::Sell => &self.token_out,
        }
    }

    /// The token used to price the trade
    pub fn counter_leg(&self) -> &TradeLeg {
        match self.direction {
            TradeDirection::Buy => &self.token_out,
            TradeDirection::Sell => &self.token_in,
        }
    }

    pub fn key(&self) -> TradeKey {
        TradeKey {
            wallet_address: self.wallet_address.clone(),
            chain: self.chain,
            tx_hash: self.tx_hash.clone(),
        }
    }
}

/// Upsert identity of a stored trade
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeKey {
    pub wallet_address: String,
    pub chain: EvmChain,
    pub tx_hash: String,
}

/// `0x` followed by 40 hex characters, any case
pub fn is_valid_evm_address(address: &str) -> bool {
    is_prefixed_hex(address, 40)
}

/// `0x` followed by 64 hex characters, any case
pub fn is_valid_tx_hash(hash: &str) -> bool {
    is_prefixed_hex(hash, 64)
}

fn is_prefixed_hex(value: &str, digits: usize) -> bool {
    value.len() == digits + 2
        && value.starts_with("0x")
        && value[2..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::transfer::{RawTransfer, ValidatedTransfer};
    use serde_json::json;

    pub const WALLET: &str = "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3";
    pub const ROUTER: &str = "0x7a250d5630b4cf539739df2c5dacb4c659f2488d";
    pub const POOL: &str = "0xb4e16d0168e52d35cacd2c6185b44281ec28c9dc";
    pub const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
    pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    pub const PEPE: &str = "0x6982508145454ce325ddbe47a25d4ec3d2311933";
    pub const TX: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";

    pub fn raw(from: &str, to: &str, symbol: &str, token: Option<&str>, decimals: u32, value: u128) -> RawTransfer {
        RawTransfer {
            tx_hash: TX.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            asset_symbol: Some(symbol.to_string()),
            token_address: token.map(str::to_string),
            precision: json!(format!("0x{:x}", decimals)),
            raw_value: Some(format!("0x{:x}", value)),
            category: if token.is_some() { "erc20" } else { "external" }.to_string(),
            block_number: Some("0x12a05f2".to_string()),
            block_timestamp: Some("2024-03-01T12:00:00.000Z".to_string()),
            log_index: None,
            unique_id: None,
        }
    }

    pub fn transfer(from: &str, to: &str, symbol: &str, token: Option<&str>, decimals: u32, value: u128) -> ValidatedTransfer {
        ValidatedTransfer::try_from_raw(raw(from, to, symbol, token, decimals, value))
            .expect("fixture transfer must validate")
    }

    pub fn units(amount: u128, decimals: u32) -> u128 {
        amount * 10u128.pow(decimals)
    }
}
