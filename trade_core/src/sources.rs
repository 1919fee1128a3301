//! Capabilities the sync cycle consumes. Concrete clients live in their own crates.

use crate::chain::EvmChain;
use crate::transfer::{RawTransfer, TransferDirection};
use crate::{CanonicalTrade, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

#[async_trait]
pub trait TransferSource: Send + Sync {
    /// One capped page of transfers where `wallet` is on the given side, over the
    /// closed block range `[from_block, to_block]`
    async fn fetch_transfers(
        &self,
        wallet: &str,
        chain: EvmChain,
        from_block: u64,
        to_block: u64,
        direction: TransferDirection,
    ) -> Result<Vec<RawTransfer>>;
}

#[async_trait]
pub trait ChainTipSource: Send + Sync {
    /// Current head block number, fetched fresh on every call
    async fn chain_tip(&self, chain: EvmChain) -> Result<u64>;
}

#[async_trait]
pub trait NativePriceSource: Send + Sync {
    /// USD price of the chain's native asset at `timestamp`
    async fn native_price_usd(&self, chain: EvmChain, timestamp: DateTime<Utc>) -> Result<Decimal>;
}

#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Insert or replace the trade keyed by `(wallet_address, chain, tx_hash)`
    async fn upsert_trade(&self, trade: &CanonicalTrade) -> Result<()>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, wallet: &str, chain: EvmChain) -> Result<Option<String>>;

    /// Persist `cursor` (hex block number). Implementations must never move a stored
    /// cursor backwards.
    async fn store_cursor(&self, wallet: &str, chain: EvmChain, cursor: &str) -> Result<()>;
}
