use crate::SwapError;
use config_manager::normalize_chain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// EVM chains the sync engine knows how to reconstruct swaps on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvmChain {
    Ethereum,
    Base,
    Arbitrum,
    Optimism,
    Polygon,
    Bsc,
}

impl EvmChain {
    pub const ALL: [EvmChain; 6] = [
        EvmChain::Ethereum,
        EvmChain::Base,
        EvmChain::Arbitrum,
        EvmChain::Optimism,
        EvmChain::Polygon,
        EvmChain::Bsc,
    ];

    /// Canonical identifier, also the value stored alongside trades and cursors
    pub fn as_str(&self) -> &'static str {
        match self {
            EvmChain::Ethereum => "ethereum",
            EvmChain::Base => "base",
            EvmChain::Arbitrum => "arbitrum",
            EvmChain::Optimism => "optimism",
            EvmChain::Polygon => "polygon",
            EvmChain::Bsc => "bsc",
        }
    }

    /// Network slug used in Alchemy RPC URLs
    pub fn alchemy_network(&self) -> &'static str {
        match self {
            EvmChain::Ethereum => "eth-mainnet",
            EvmChain::Base => "base-mainnet",
            EvmChain::Arbitrum => "arb-mainnet",
            EvmChain::Optimism => "opt-mainnet",
            EvmChain::Polygon => "polygon-mainnet",
            EvmChain::Bsc => "bnb-mainnet",
        }
    }

    /// Symbols treated as the chain's native asset, wrapped form included
    pub fn native_symbols(&self) -> &'static [&'static str] {
        match self {
            EvmChain::Ethereum | EvmChain::Base | EvmChain::Arbitrum | EvmChain::Optimism => {
                &["ETH", "WETH"]
            }
            EvmChain::Polygon => &["POL", "WPOL", "MATIC", "WMATIC"],
            EvmChain::Bsc => &["BNB", "WBNB"],
        }
    }

    pub fn is_native_symbol(&self, symbol: &str) -> bool {
        let symbol = symbol.trim().to_uppercase();
        self.native_symbols().iter().any(|native| *native == symbol)
    }

    /// DefiLlama coin id of the native asset, for historical USD prices
    pub fn native_price_coin_id(&self) -> &'static str {
        match self {
            EvmChain::Ethereum | EvmChain::Base | EvmChain::Arbitrum | EvmChain::Optimism => {
                "coingecko:ethereum"
            }
            EvmChain::Polygon => "coingecko:polygon-ecosystem-token",
            EvmChain::Bsc => "coingecko:binancecoin",
        }
    }

    /// Alchemy only indexes the `internal` transfer category on these networks
    pub fn supports_internal_transfers(&self) -> bool {
        matches!(self, EvmChain::Ethereum | EvmChain::Polygon)
    }
}

impl fmt::Display for EvmChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvmChain {
    type Err = SwapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = normalize_chain(s).map_err(|_| SwapError::UnsupportedChain(s.trim().to_string()))?;
        EvmChain::ALL
            .iter()
            .copied()
            .find(|chain| chain.as_str() == canonical)
            .ok_or(SwapError::UnsupportedChain(canonical))
    }
}
