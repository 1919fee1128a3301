//! In-process store with the same upsert and cursor rules as PostgreSQL.
//! Used for dry runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use trade_core::{CanonicalTrade, CursorStore, EvmChain, TradeKey, TradeStore};

use crate::{Result, StoredCursor};

#[derive(Debug, Default)]
pub struct MemoryStore {
    trades: RwLock<HashMap<TradeKey, CanonicalTrade>>,
    cursors: RwLock<HashMap<(String, EvmChain), StoredCursor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_trade(&self, trade: &CanonicalTrade) {
        let previous = self.trades.write().await.insert(trade.key(), trade.clone());
        debug!(
            "{} trade {} for wallet {} on {}",
            if previous.is_some() { "Replaced" } else { "Stored" },
            trade.tx_hash,
            trade.wallet_address,
            trade.chain
        );
    }

    /// Returns false when the write was ignored because it would move the cursor backwards
    pub async fn put_cursor(&self, wallet: &str, chain: EvmChain, cursor: &str) -> Result<bool> {
        let stored = StoredCursor::parse(cursor)?;
        let mut cursors = self.cursors.write().await;
        let key = (wallet.to_string(), chain);

        match cursors.get(&key) {
            Some(existing) if existing.block_number > stored.block_number => {
                warn!(
                    "Ignored stale cursor {} for wallet {} on {} (stored {})",
                    cursor, wallet, chain, existing.cursor
                );
                Ok(false)
            }
            _ => {
                cursors.insert(key, stored);
                Ok(true)
            }
        }
    }

    /// All stored trades ordered by timestamp, then tx hash
    pub async fn trades(&self) -> Vec<CanonicalTrade> {
        let mut trades: Vec<CanonicalTrade> = self.trades.read().await.values().cloned().collect();
        trades.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.tx_hash.cmp(&b.tx_hash)));
        trades
    }

    pub async fn trade(&self, key: &TradeKey) -> Option<CanonicalTrade> {
        self.trades.read().await.get(key).cloned()
    }

    pub async fn trade_count(&self) -> usize {
        self.trades.read().await.len()
    }

    pub async fn cursor(&self, wallet: &str, chain: EvmChain) -> Option<String> {
        self.cursors
            .read()
            .await
            .get(&(wallet.to_string(), chain))
            .map(|c| c.cursor.clone())
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn upsert_trade(&self, trade: &CanonicalTrade) -> trade_core::Result<()> {
        self.insert_trade(trade).await;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, wallet: &str, chain: EvmChain) -> trade_core::Result<Option<String>> {
        Ok(self.cursor(wallet, chain).await)
    }

    async fn store_cursor(&self, wallet: &str, chain: EvmChain, cursor: &str) -> trade_core::Result<()> {
        self.put_cursor(wallet, chain, cursor).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use serde_json::json;
    use trade_core::{TradeDirection, TradeLeg};

    const WALLET: &str = "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3";

    fn leg(symbol: &str, amount: i64) -> TradeLeg {
        TradeLeg {
            address: format!("0x{:040x}", amount),
            symbol: symbol.to_string(),
            decimals: 18,
            normalized_amount: Decimal::from(amount),
        }
    }

    fn trade(tx_hash: &str, direction: TradeDirection, usd_value: Option<Decimal>) -> CanonicalTrade {
        CanonicalTrade {
            wallet_address: WALLET.to_string(),
            chain: EvmChain::Ethereum,
            tx_hash: tx_hash.to_string(),
            tx_index: None,
            direction,
            token_in: leg("USDC", 2500),
            token_out: leg("WETH", 1),
            price: Some(Decimal::from(2500)),
            native_price_usd: None,
            usd_price_per_token: usd_value,
            usd_value,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            raw_payload: json!({}),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = MemoryStore::new();
        let first = trade("0xaa", TradeDirection::Sell, None);
        store.upsert_trade(&first).await.unwrap();

        let mut second = trade("0xaa", TradeDirection::Sell, Some(Decimal::from(2500)));
        second.price = Some(Decimal::from(2501));
        store.upsert_trade(&second).await.unwrap();

        assert_eq!(store.trade_count().await, 1);
        let stored = store.trade(&first.key()).await.unwrap();
        assert_eq!(stored.price, Some(Decimal::from(2501)));
        assert_eq!(stored.usd_value, Some(Decimal::from(2500)));
    }

    #[tokio::test]
    async fn test_distinct_chains_are_distinct_rows() {
        let store = MemoryStore::new();
        let eth = trade("0xaa", TradeDirection::Buy, None);
        let mut base = eth.clone();
        base.chain = EvmChain::Base;

        store.upsert_trade(&eth).await.unwrap();
        store.upsert_trade(&base).await.unwrap();
        assert_eq!(store.trade_count().await, 2);
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let store = MemoryStore::new();
        assert!(store.load_cursor(WALLET, EvmChain::Base).await.unwrap().is_none());

        assert!(store.put_cursor(WALLET, EvmChain::Base, "0x200").await.unwrap());
        assert!(!store.put_cursor(WALLET, EvmChain::Base, "0x1ff").await.unwrap());
        assert!(store.put_cursor(WALLET, EvmChain::Base, "0x200").await.unwrap());
        assert_eq!(store.cursor(WALLET, EvmChain::Base).await.as_deref(), Some("0x200"));

        store.store_cursor(WALLET, EvmChain::Base, "0x300").await.unwrap();
        assert_eq!(
            store.load_cursor(WALLET, EvmChain::Base).await.unwrap().as_deref(),
            Some("0x300")
        );
    }

    #[tokio::test]
    async fn test_sentinel_cursor_rejected() {
        let store = MemoryStore::new();
        let result = store.store_cursor(WALLET, EvmChain::Ethereum, "0x0").await;
        assert!(matches!(result, Err(trade_core::SwapError::Storage(_))));
    }
}
