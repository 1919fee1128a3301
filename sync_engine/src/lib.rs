use config_manager::{SyncConfig, WalletTarget};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use trade_core::{
    ChainTipSource, CursorStore, EvmChain, NativePriceSource, SwapError, TradeStore, TransferSource,
    SAFETY_MARGIN_BLOCKS,
};

pub mod engine;
pub mod locks;
pub mod report;

pub use engine::WalletSyncEngine;
pub use locks::SyncLocks;
pub use report::CycleReport;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),
    #[error("Block range resolution failed: {0}")]
    RangeResolution(String),
    #[error("Transfer fetch failed: {0}")]
    Fetch(String),
    #[error("Cursor persistence failed: {0}")]
    CursorPersistence(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Core error: {0}")]
    Core(String),
}

impl From<SwapError> for SyncError {
    fn from(err: SwapError) -> Self {
        match err {
            SwapError::UnsupportedChain(_) => SyncError::Config(err.to_string()),
            _ => SyncError::Core(err.to_string()),
        }
    }
}

impl From<config_manager::ConfigurationError> for SyncError {
    fn from(err: config_manager::ConfigurationError) -> Self {
        SyncError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Tunables for one wallet cycle
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub safety_margin_blocks: u64,
    /// Pause between consecutive transaction groups
    pub inter_item_delay: Duration,
    /// First block scanned on a wallet's initial sync
    pub launch_blocks: HashMap<EvmChain, u64>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            safety_margin_blocks: SAFETY_MARGIN_BLOCKS,
            inter_item_delay: Duration::from_millis(250),
            launch_blocks: HashMap::new(),
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let launch_blocks = config
            .launch_blocks
            .iter()
            .map(|(chain, block)| -> Result<(EvmChain, u64)> { Ok((EvmChain::from_str(chain)?, *block)) })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            safety_margin_blocks: config.safety_margin_blocks,
            inter_item_delay: Duration::from_millis(config.inter_item_delay_ms),
            launch_blocks,
        })
    }

    pub fn launch_floor(&self, chain: EvmChain) -> Option<u64> {
        self.launch_blocks.get(&chain).copied()
    }
}

/// External capabilities one engine runs against
#[derive(Clone)]
pub struct SyncCollaborators {
    pub transfers: Arc<dyn TransferSource>,
    pub chain_tips: Arc<dyn ChainTipSource>,
    pub prices: Arc<dyn NativePriceSource>,
    pub trades: Arc<dyn TradeStore>,
    pub cursors: Arc<dyn CursorStore>,
}

/// One `(wallet, chain)` pair to sync
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTarget {
    pub wallet: String,
    pub chain: EvmChain,
}

impl SyncTarget {
    pub fn new(wallet: &str, chain: EvmChain) -> Self {
        Self {
            wallet: wallet.trim().to_lowercase(),
            chain,
        }
    }

    /// Expand configured wallets into one target per chain
    pub fn from_config(wallets: &[WalletTarget]) -> Result<Vec<Self>> {
        let mut targets = Vec::new();
        for wallet in wallets {
            for chain in &wallet.chains {
                targets.push(Self::new(&wallet.address, EvmChain::from_str(chain)?));
            }
        }
        Ok(targets)
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.wallet, self.chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = config_manager::SystemConfig::default().sync;
        config.launch_blocks.insert("bnb".to_string(), 123);
        config.inter_item_delay_ms = 10;

        let settings = SyncSettings::from_config(&config).unwrap();
        assert_eq!(settings.launch_floor(EvmChain::Ethereum), Some(10_000_835));
        assert_eq!(settings.launch_floor(EvmChain::Bsc), Some(123));
        assert_eq!(settings.launch_floor(EvmChain::Base), None);
        assert_eq!(settings.inter_item_delay, Duration::from_millis(10));
        assert_eq!(settings.safety_margin_blocks, 5);
    }

    #[test]
    fn test_unknown_launch_chain_is_config_error() {
        let mut config = config_manager::SystemConfig::default().sync;
        config.launch_blocks.insert("solana".to_string(), 1);
        assert!(matches!(SyncSettings::from_config(&config), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_targets_expand_per_chain() {
        let wallets = vec![WalletTarget {
            address: "0x742D35CC6131B2F6E7F4C3B5E8A8C8D8F0B4C4E3".to_string(),
            chains: vec!["ethereum".to_string(), "arb".to_string()],
        }];
        let targets = SyncTarget::from_config(&wallets).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].wallet, "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3");
        assert_eq!(targets[1].chain, EvmChain::Arbitrum);
        assert_eq!(
            targets[1].to_string(),
            "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3@arbitrum"
        );
    }
}
