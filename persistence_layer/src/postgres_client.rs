use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, warn};
use trade_core::{CanonicalTrade, CursorStore, EvmChain, TradeStore};

use crate::{PersistenceError, Result, StoredCursor};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS swap_trades (
        id BIGSERIAL PRIMARY KEY,
        wallet_address TEXT NOT NULL,
        chain TEXT NOT NULL,
        tx_hash TEXT NOT NULL,
        tx_index INTEGER,
        direction TEXT NOT NULL,
        token_in_address TEXT NOT NULL,
        token_in_symbol TEXT NOT NULL,
        token_in_decimals INTEGER NOT NULL,
        token_in_amount NUMERIC NOT NULL,
        token_out_address TEXT NOT NULL,
        token_out_symbol TEXT NOT NULL,
        token_out_decimals INTEGER NOT NULL,
        token_out_amount NUMERIC NOT NULL,
        price NUMERIC,
        native_price_usd NUMERIC,
        usd_price_per_token NUMERIC,
        usd_value NUMERIC,
        block_timestamp TIMESTAMPTZ NOT NULL,
        raw_payload JSONB NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (wallet_address, chain, tx_hash)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_swap_trades_wallet_time ON swap_trades (wallet_address, chain, block_timestamp)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_cursors (
        wallet_address TEXT NOT NULL,
        chain TEXT NOT NULL,
        cursor TEXT NOT NULL,
        block_number BIGINT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (wallet_address, chain)
    )
    "#,
];

/// PostgreSQL client for reconstructed trades and sync cursors
#[derive(Debug, Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await
            .map_err(|e| {
                PersistenceError::PoolCreation(format!("PostgreSQL connection error: {}", e))
            })?;

        info!(
            "PostgreSQL pool initialized: max_connections={}, acquire_timeout=30s",
            max_connections
        );
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("swap_trades / sync_cursors schema ensured");
        Ok(())
    }

    // =====================================
    // Trades
    // =====================================

    /// Insert a trade, or replace every derived field of the stored one
    pub async fn store_trade(&self, trade: &CanonicalTrade) -> Result<()> {
        let raw_payload = serde_json::to_string(&trade.raw_payload)?;
        let tx_index = trade
            .tx_index
            .map(i32::try_from)
            .transpose()
            .map_err(|_| PersistenceError::InvalidData(format!("tx index out of range in {}", trade.tx_hash)))?;

        sqlx::query(
            r#"
            INSERT INTO swap_trades
            (wallet_address, chain, tx_hash, tx_index, direction,
             token_in_address, token_in_symbol, token_in_decimals, token_in_amount,
             token_out_address, token_out_symbol, token_out_decimals, token_out_amount,
             price, native_price_usd, usd_price_per_token, usd_value,
             block_timestamp, raw_payload, updated_at)
            VALUES ($1, $2, $3, $4, $5,
                    $6, $7, $8, $9::numeric,
                    $10, $11, $12, $13::numeric,
                    $14::numeric, $15::numeric, $16::numeric, $17::numeric,
                    $18, $19::jsonb, NOW())
            ON CONFLICT (wallet_address, chain, tx_hash)
            DO UPDATE SET
                tx_index = EXCLUDED.tx_index,
                direction = EXCLUDED.direction,
                token_in_address = EXCLUDED.token_in_address,
                token_in_symbol = EXCLUDED.token_in_symbol,
                token_in_decimals = EXCLUDED.token_in_decimals,
                token_in_amount = EXCLUDED.token_in_amount,
                token_out_address = EXCLUDED.token_out_address,
                token_out_symbol = EXCLUDED.token_out_symbol,
                token_out_decimals = EXCLUDED.token_out_decimals,
                token_out_amount = EXCLUDED.token_out_amount,
                price = EXCLUDED.price,
                native_price_usd = EXCLUDED.native_price_usd,
                usd_price_per_token = EXCLUDED.usd_price_per_token,
                usd_value = EXCLUDED.usd_value,
                block_timestamp = EXCLUDED.block_timestamp,
                raw_payload = EXCLUDED.raw_payload,
                updated_at = NOW()
            "#,
        )
        .bind(&trade.wallet_address)
        .bind(trade.chain.as_str())
        .bind(&trade.tx_hash)
        .bind(tx_index)
        .bind(trade.direction.as_str())
        .bind(&trade.token_in.address)
        .bind(&trade.token_in.symbol)
        .bind(trade.token_in.decimals as i32)
        .bind(trade.token_in.normalized_amount.to_string())
        .bind(&trade.token_out.address)
        .bind(&trade.token_out.symbol)
        .bind(trade.token_out.decimals as i32)
        .bind(trade.token_out.normalized_amount.to_string())
        .bind(trade.price.map(|d| d.to_string()))
        .bind(trade.native_price_usd.map(|d| d.to_string()))
        .bind(trade.usd_price_per_token.map(|d| d.to_string()))
        .bind(trade.usd_value.map(|d| d.to_string()))
        .bind(trade.timestamp)
        .bind(raw_payload)
        .execute(&self.pool)
        .await?;

        debug!(
            "Upserted {} trade {} for wallet {} on {}",
            trade.direction, trade.tx_hash, trade.wallet_address, trade.chain
        );
        Ok(())
    }

    /// Number of stored trades for a wallet on a chain
    pub async fn count_trades(&self, wallet_address: &str, chain: EvmChain) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM swap_trades WHERE wallet_address = $1 AND chain = $2",
        )
        .bind(wallet_address)
        .bind(chain.as_str())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count.max(0) as u64)
    }

    // =====================================
    // Sync cursors
    // =====================================

    pub async fn get_cursor(&self, wallet_address: &str, chain: EvmChain) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT cursor FROM sync_cursors WHERE wallet_address = $1 AND chain = $2",
        )
        .bind(wallet_address)
        .bind(chain.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<String, _>("cursor")))
    }

    /// Upsert the cursor. A write whose block number is below the stored one is ignored.
    pub async fn set_cursor(&self, wallet_address: &str, chain: EvmChain, cursor: &str) -> Result<bool> {
        let stored = StoredCursor::parse(cursor)?;
        let block_number = i64::try_from(stored.block_number).map_err(|_| {
            PersistenceError::InvalidData(format!("cursor {} exceeds BIGINT", cursor))
        })?;

        let result = sqlx::query(
            r#"
            INSERT INTO sync_cursors (wallet_address, chain, cursor, block_number, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (wallet_address, chain)
            DO UPDATE SET
                cursor = EXCLUDED.cursor,
                block_number = EXCLUDED.block_number,
                updated_at = NOW()
            WHERE sync_cursors.block_number <= EXCLUDED.block_number
            "#,
        )
        .bind(wallet_address)
        .bind(chain.as_str())
        .bind(&stored.cursor)
        .bind(block_number)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() > 0;
        if !applied {
            warn!(
                "Ignored stale cursor {} for wallet {} on {}",
                cursor, wallet_address, chain
            );
        }
        Ok(applied)
    }

    // =====================================
    // Health and Utility
    // =====================================

    /// Test PostgreSQL connectivity
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1 as test").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TradeStore for PostgresClient {
    async fn upsert_trade(&self, trade: &CanonicalTrade) -> trade_core::Result<()> {
        Ok(self.store_trade(trade).await?)
    }
}

#[async_trait]
impl CursorStore for PostgresClient {
    async fn load_cursor(&self, wallet: &str, chain: EvmChain) -> trade_core::Result<Option<String>> {
        Ok(self.get_cursor(wallet, chain).await?)
    }

    async fn store_cursor(&self, wallet: &str, chain: EvmChain, cursor: &str) -> trade_core::Result<()> {
        self.set_cursor(wallet, chain, cursor).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use trade_core::{TradeDirection, TradeLeg};

    fn sample_trade(wallet: &str) -> CanonicalTrade {
        let leg = |symbol: &str, amount: i64| TradeLeg {
            address: format!("0x{:040x}", amount),
            symbol: symbol.to_string(),
            decimals: 18,
            normalized_amount: Decimal::from(amount),
        };
        CanonicalTrade {
            wallet_address: wallet.to_string(),
            chain: EvmChain::Base,
            tx_hash: format!("0x{:064x}", 1),
            tx_index: None,
            direction: TradeDirection::Sell,
            token_in: leg("USDC", 2500),
            token_out: leg("WETH", 1),
            price: Some(Decimal::from(2500)),
            native_price_usd: None,
            usd_price_per_token: Some(Decimal::ONE),
            usd_value: None,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            raw_payload: serde_json::json!({ "transfers": [] }),
        }
    }

    #[tokio::test]
    async fn test_postgres_roundtrip() {
        // This test requires a running PostgreSQL instance
        // Skip if DATABASE_URL is not set
        let Ok(url) = std::env::var("DATABASE_URL") else {
            return;
        };

        let client = PostgresClient::new(&url, 2).await.unwrap();
        client.health_check().await.unwrap();
        client.ensure_schema().await.unwrap();

        let wallet = "0x00000000000000000000000000000000000000aa";
        let mut trade = sample_trade(wallet);
        client.store_trade(&trade).await.unwrap();
        trade.usd_value = Some(Decimal::from(2500));
        client.store_trade(&trade).await.unwrap();
        assert_eq!(client.count_trades(wallet, EvmChain::Base).await.unwrap(), 1);

        assert!(client.set_cursor(wallet, EvmChain::Base, "0x200").await.unwrap());
        // Moving backwards is a no-op
        assert!(!client.set_cursor(wallet, EvmChain::Base, "0x100").await.unwrap());
        assert_eq!(
            client.get_cursor(wallet, EvmChain::Base).await.unwrap().as_deref(),
            Some("0x200")
        );
    }
}
