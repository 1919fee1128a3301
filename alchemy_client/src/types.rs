use serde::{Deserialize, Serialize};
use trade_core::{EvmChain, RawTransfer, TransferDirection};

/// Configuration for the Alchemy transfers client
#[derive(Debug, Clone)]
pub struct AlchemyConfig {
    pub api_key: String,
    /// `{network}` is substituted with the chain's Alchemy network slug
    pub base_url_template: String,
    pub timeout_seconds: u64,
    /// Page cap per directional query
    pub max_count: u32,
    pub categories: Vec<String>,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for AlchemyConfig {
    fn default() -> Self {
        Self::from(&config_manager::SystemConfig::default().alchemy)
    }
}

impl From<&config_manager::AlchemyConfig> for AlchemyConfig {
    fn from(config: &config_manager::AlchemyConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url_template: config.base_url_template.clone(),
            timeout_seconds: config.request_timeout_seconds,
            max_count: config.max_count,
            categories: config.categories.clone(),
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }
}

impl AlchemyConfig {
    /// JSON-RPC endpoint for `chain`, including the API key path segment
    pub fn endpoint(&self, chain: EvmChain) -> String {
        let base = self
            .base_url_template
            .replace("{network}", chain.alchemy_network());
        format!("{}/{}", base.trim_end_matches('/'), self.api_key)
    }

    /// Configured categories the chain can serve. Internal transfers are only
    /// indexed on Ethereum and Polygon; asking elsewhere is a request error.
    pub fn categories_for(&self, chain: EvmChain) -> Vec<String> {
        self.categories
            .iter()
            .filter(|c| c.as_str() != "internal" || chain.supports_internal_transfers())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: P,
}

impl<P> JsonRpcRequest<P> {
    pub fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// Parameters of `alchemy_getAssetTransfers`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfersParams {
    pub from_block: String,
    pub to_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,
    pub category: Vec<String>,
    pub with_metadata: bool,
    pub exclude_zero_value: bool,
    pub max_count: String,
    pub order: String,
}

impl AssetTransfersParams {
    /// One ascending page over the closed range `[from_block, to_block]`
    pub fn new(
        wallet: &str,
        direction: TransferDirection,
        from_block: u64,
        to_block: u64,
        categories: Vec<String>,
        max_count: u32,
    ) -> Self {
        let (from_address, to_address) = match direction {
            TransferDirection::From => (Some(wallet.to_string()), None),
            TransferDirection::To => (None, Some(wallet.to_string())),
        };

        Self {
            from_block: format!("{:#x}", from_block),
            to_block: format!("{:#x}", to_block),
            from_address,
            to_address,
            category: categories,
            with_metadata: true,
            exclude_zero_value: true,
            max_count: format!("{:#x}", max_count),
            order: "asc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfersResult {
    #[serde(default)]
    pub transfers: Vec<AssetTransfer>,
    /// Present when more results exist beyond this page
    pub page_key: Option<String>,
}

/// Transfer as returned by `alchemy_getAssetTransfers`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetTransfer {
    pub block_num: Option<String>,
    pub unique_id: Option<String>,
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Float rendering of the amount; never used for arithmetic
    #[serde(default)]
    pub value: serde_json::Value,
    pub asset: Option<String>,
    pub category: String,
    #[serde(default)]
    pub raw_contract: RawContract,
    pub metadata: Option<TransferMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContract {
    pub value: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub decimal: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    pub block_timestamp: Option<String>,
}

impl AssetTransfer {
    /// Map onto the indexer-neutral transfer record. No validation happens here.
    pub fn into_raw(self) -> RawTransfer {
        let log_index = self.unique_id.as_deref().and_then(log_index_from_unique_id);

        RawTransfer {
            tx_hash: self.hash,
            from: self.from,
            to: self.to,
            asset_symbol: self.asset,
            token_address: self.raw_contract.address,
            precision: self.raw_contract.decimal,
            raw_value: self.raw_contract.value,
            category: self.category,
            block_number: self.block_num,
            block_timestamp: self.metadata.and_then(|m| m.block_timestamp),
            log_index,
            unique_id: self.unique_id,
        }
    }
}

/// Alchemy unique ids look like `{hash}:log:{index}` for token transfers and
/// `{hash}:external` / `{hash}:internal:{n}` otherwise
pub fn log_index_from_unique_id(unique_id: &str) -> Option<u32> {
    let (_, index) = unique_id.rsplit_once(":log:")?;
    match index.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => index.parse().ok(),
    }
}

/// Parse a `0x`-prefixed quantity such as the `eth_blockNumber` result
pub fn parse_hex_quantity(value: &str) -> Option<u64> {
    let hex = value.trim().strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WALLET: &str = "0x742d35cc6131b2f6e7f4c3b5e8a8c8d8f0b4c4e3";

    #[test]
    fn test_params_for_outgoing_query() {
        let params = AssetTransfersParams::new(
            WALLET,
            TransferDirection::From,
            100,
            255,
            vec!["erc20".to_string()],
            1000,
        );
        let value = serde_json::to_value(&params).unwrap();

        assert_eq!(value["fromBlock"], "0x64");
        assert_eq!(value["toBlock"], "0xff");
        assert_eq!(value["fromAddress"], WALLET);
        assert!(value.get("toAddress").is_none());
        assert_eq!(value["maxCount"], "0x3e8");
        assert_eq!(value["order"], "asc");
        assert_eq!(value["withMetadata"], true);
        assert_eq!(value["excludeZeroValue"], true);
    }

    #[test]
    fn test_params_for_incoming_query() {
        let params = AssetTransfersParams::new(WALLET, TransferDirection::To, 0, 1, vec![], 10);
        let value = serde_json::to_value(&params).unwrap();
        assert!(value.get("fromAddress").is_none());
        assert_eq!(value["toAddress"], WALLET);
        assert_eq!(value["maxCount"], "0xa");
    }

    #[test]
    fn test_endpoint_substitutes_network() {
        let config = AlchemyConfig {
            api_key: "demo".to_string(),
            ..AlchemyConfig::default()
        };
        assert_eq!(
            config.endpoint(EvmChain::Base),
            "https://base-mainnet.g.alchemy.com/v2/demo"
        );
        assert_eq!(
            config.endpoint(EvmChain::Bsc),
            "https://bnb-mainnet.g.alchemy.com/v2/demo"
        );
    }

    #[test]
    fn test_internal_category_dropped_where_unsupported() {
        let config = AlchemyConfig::default();
        assert!(config.categories_for(EvmChain::Ethereum).contains(&"internal".to_string()));
        assert!(!config.categories_for(EvmChain::Base).contains(&"internal".to_string()));
        assert!(config.categories_for(EvmChain::Base).contains(&"erc20".to_string()));
    }

    #[test]
    fn test_log_index_parsing() {
        assert_eq!(log_index_from_unique_id("0xabc:log:0x1f"), Some(31));
        assert_eq!(log_index_from_unique_id("0xabc:log:7"), Some(7));
        assert_eq!(log_index_from_unique_id("0xabc:external"), None);
        assert_eq!(log_index_from_unique_id("0xabc:internal:0"), None);
    }

    #[test]
    fn test_native_transfer_without_contract_address() {
        let transfer: AssetTransfer = serde_json::from_value(json!({
            "blockNum": "0x12a05f2",
            "uniqueId": "0x5e1c:external",
            "hash": "0x5e1c",
            "from": WALLET,
            "to": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
            "value": 0.5,
            "asset": "ETH",
            "category": "external",
            "rawContract": { "value": "0x6f05b59d3b20000", "address": null, "decimal": "0x12" },
            "metadata": { "blockTimestamp": "2024-03-01T12:00:00.000Z" }
        }))
        .unwrap();

        let raw = transfer.into_raw();
        assert_eq!(raw.token_address, None);
        assert_eq!(raw.precision, json!("0x12"));
        assert_eq!(raw.raw_value.as_deref(), Some("0x6f05b59d3b20000"));
        assert_eq!(raw.log_index, None);
        assert_eq!(raw.block_timestamp.as_deref(), Some("2024-03-01T12:00:00.000Z"));
    }

    #[test]
    fn test_hex_quantity() {
        assert_eq!(parse_hex_quantity("0x12a05f2"), Some(19_531_250));
        assert_eq!(parse_hex_quantity("12"), None);
        assert_eq!(parse_hex_quantity("0xzz"), None);
    }
}
