use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trade_core::EvmChain;
use uuid::Uuid;

/// Counters and outcome of one wallet sync cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub wallet: String,
    pub chain: EvmChain,
    pub started_at: DateTime<Utc>,
    pub from_block: u64,
    pub to_block: u64,
    pub previous_cursor: Option<String>,
    pub new_cursor: Option<String>,
    pub transfers_fetched: usize,
    pub transfers_rejected: usize,
    pub duplicates_dropped: usize,
    pub groups_total: usize,
    pub swap_candidates: usize,
    /// Candidates the classifier judged not to be swaps
    pub groups_skipped: usize,
    pub trades_classified: usize,
    pub trades_persisted: usize,
    pub classification_failures: usize,
    pub price_lookup_failures: usize,
    pub persistence_failures: usize,
    pub elapsed_ms: u64,
}

impl CycleReport {
    pub fn new(wallet: &str, chain: EvmChain) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            wallet: wallet.to_string(),
            chain,
            started_at: Utc::now(),
            from_block: 0,
            to_block: 0,
            previous_cursor: None,
            new_cursor: None,
            transfers_fetched: 0,
            transfers_rejected: 0,
            duplicates_dropped: 0,
            groups_total: 0,
            swap_candidates: 0,
            groups_skipped: 0,
            trades_classified: 0,
            trades_persisted: 0,
            classification_failures: 0,
            price_lookup_failures: 0,
            persistence_failures: 0,
            elapsed_ms: 0,
        }
    }

    /// Zero-work cycle: the resolved range was empty
    pub fn is_idle(&self) -> bool {
        self.transfers_fetched == 0 && self.from_block >= self.to_block
    }

    pub fn had_failures(&self) -> bool {
        self.classification_failures + self.persistence_failures + self.transfers_rejected > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} on {}: blocks {}..={}, {} transfers ({} rejected, {} duplicates), {} candidates, {} trades classified, {} persisted, {} failed to classify, {} failed to persist, {} unpriced by lookup failure, cursor {} -> {} in {}ms",
            self.wallet,
            self.chain,
            self.from_block,
            self.to_block,
            self.transfers_fetched,
            self.transfers_rejected,
            self.duplicates_dropped,
            self.swap_candidates,
            self.trades_classified,
            self.trades_persisted,
            self.classification_failures,
            self.persistence_failures,
            self.price_lookup_failures,
            self.previous_cursor.as_deref().unwrap_or("none"),
            self.new_cursor.as_deref().unwrap_or("none"),
            self.elapsed_ms
        )
    }
}
