use crate::chain::EvmChain;
use crate::sources::NativePriceSource;
use crate::CanonicalTrade;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Counter tokens valued at exactly one dollar
pub const STABLECOIN_SYMBOLS: &[&str] = &[
    "USDC", "USDT", "DAI", "BUSD", "USDC.E", "USDBC", "USDT.E", "FRAX", "TUSD", "USDP", "LUSD",
    "PYUSD", "FDUSD", "USDE", "GUSD",
];

pub fn is_stablecoin(symbol: &str) -> bool {
    let symbol = symbol.trim().to_uppercase();
    STABLECOIN_SYMBOLS.iter().any(|stable| *stable == symbol)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAsset {
    Stablecoin,
    Native,
    Unpriced,
}

pub fn classify_counter(symbol: &str, chain: EvmChain) -> CounterAsset {
    if is_stablecoin(symbol) {
        CounterAsset::Stablecoin
    } else if chain.is_native_symbol(symbol) {
        CounterAsset::Native
    } else {
        CounterAsset::Unpriced
    }
}

/// What happened while pricing one trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationOutcome {
    Stablecoin,
    Native,
    PriceLookupFailed,
    Unpriced,
}

/// Best-effort USD enrichment. Never fails; a failed lookup leaves the USD fields empty.
#[derive(Clone)]
pub struct UsdValuation {
    prices: Arc<dyn NativePriceSource>,
}

impl UsdValuation {
    pub fn new(prices: Arc<dyn NativePriceSource>) -> Self {
        Self { prices }
    }

    pub async fn enrich(&self, trade: &mut CanonicalTrade) -> ValuationOutcome {
        trade.native_price_usd = None;
        let counter_symbol = trade.counter_leg().symbol.clone();

        let (multiplier, outcome) = match classify_counter(&counter_symbol, trade.chain) {
            CounterAsset::Stablecoin => (Some(Decimal::ONE), ValuationOutcome::Stablecoin),
            CounterAsset::Native => {
                match self.prices.native_price_usd(trade.chain, trade.timestamp).await {
                    Ok(price) => {
                        trade.native_price_usd = Some(price);
                        (Some(price), ValuationOutcome::Native)
                    }
                    Err(e) => {
                        warn!(
                            "Native price lookup failed for tx {} on {} at {}: {}",
                            trade.tx_hash, trade.chain, trade.timestamp, e
                        );
                        (None, ValuationOutcome::PriceLookupFailed)
                    }
                }
            }
            CounterAsset::Unpriced => {
                debug!("No USD reference for counter token {} in tx {}", counter_symbol, trade.tx_hash);
                (None, ValuationOutcome::Unpriced)
            }
        };

        apply_usd_multiplier(trade, multiplier);
        outcome
    }
}

/// `usd_price_per_token = price * multiplier`, `usd_value = display amount * usd_price_per_token`
pub fn apply_usd_multiplier(trade: &mut CanonicalTrade, multiplier: Option<Decimal>) {
    let usd_price = match (trade.price, multiplier) {
        (Some(price), Some(multiplier)) => price.checked_mul(multiplier),
        _ => None,
    };
    let display_amount = trade.display_leg().normalized_amount;

    trade.usd_price_per_token = usd_price;
    trade.usd_value = usd_price.and_then(|usd| display_amount.checked_mul(usd));
}
