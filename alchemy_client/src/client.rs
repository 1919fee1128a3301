use crate::{
    error::AlchemyError,
    types::{
        parse_hex_quantity, AlchemyConfig, AssetTransfer, AssetTransfersParams,
        AssetTransfersResult, JsonRpcRequest, JsonRpcResponse,
    },
};
use async_trait::async_trait;
use reqwest::Client;
use retry_utils::{retry_with_backoff, RetryPolicy};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use trade_core::{
    is_valid_evm_address, ChainTipSource, EvmChain, RawTransfer, SwapError, TransferDirection,
    TransferSource,
};

/// Alchemy JSON-RPC client for asset transfer history and chain tips
#[derive(Debug, Clone)]
pub struct AlchemyClient {
    client: Client,
    config: AlchemyConfig,
    retry: RetryPolicy,
}

impl AlchemyClient {
    pub fn new(config: AlchemyConfig) -> Result<Self, AlchemyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let retry = RetryPolicy::new(config.max_retries, config.retry_base_delay_ms);

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// One page of transfers where `wallet` is the sender (`From`) or recipient (`To`)
    pub async fn get_asset_transfers(
        &self,
        wallet: &str,
        chain: EvmChain,
        from_block: u64,
        to_block: u64,
        direction: TransferDirection,
    ) -> Result<Vec<AssetTransfer>, AlchemyError> {
        let wallet = wallet.trim().to_lowercase();
        if !is_valid_evm_address(&wallet) {
            return Err(AlchemyError::InvalidAddress { address: wallet });
        }

        let params = AssetTransfersParams::new(
            &wallet,
            direction,
            from_block,
            to_block,
            self.config.categories_for(chain),
            self.config.max_count,
        );

        debug!(
            wallet = %wallet,
            chain = %chain,
            from_block,
            to_block,
            ?direction,
            "Requesting asset transfers"
        );

        let result: AssetTransfersResult = self
            .call(chain, "alchemy_getAssetTransfers", [params])
            .await?;

        if result.page_key.is_some() {
            warn!(
                "⚠️ Transfer page for {} on {} ({:?}) hit the {} cap; the rest is picked up next cycle",
                wallet, chain, direction, self.config.max_count
            );
        }

        info!(
            "Fetched {} {:?} transfers for wallet {} on {} (blocks {}..={})",
            result.transfers.len(),
            direction,
            wallet,
            chain,
            from_block,
            to_block
        );

        Ok(result.transfers)
    }

    /// Current head block of `chain`
    pub async fn block_number(&self, chain: EvmChain) -> Result<u64, AlchemyError> {
        let result: String = self.call(chain, "eth_blockNumber", [(); 0]).await?;
        parse_hex_quantity(&result).ok_or_else(|| AlchemyError::ParseError {
            message: format!("unexpected eth_blockNumber result '{}'", result),
        })
    }

    async fn call<P, T>(&self, chain: EvmChain, method: &'static str, params: P) -> Result<T, AlchemyError>
    where
        P: Serialize + Send + Sync,
        T: DeserializeOwned + Send,
    {
        let url = self.config.endpoint(chain);
        let request = JsonRpcRequest::new(method, params);

        retry_with_backoff(
            || self.send(&url, &request),
            &self.retry,
            AlchemyError::retry_class,
        )
        .await
    }

    async fn send<P, T>(&self, url: &str, request: &JsonRpcRequest<P>) -> Result<T, AlchemyError>
    where
        P: Serialize + Send + Sync,
        T: DeserializeOwned + Send,
    {
        let start_time = std::time::Instant::now();
        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        debug!(
            "📨 {} responded {} in {:.2}s",
            request.method,
            status,
            start_time.elapsed().as_secs_f64()
        );

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("❌ Alchemy API error - Status: {}, Body: {}", status, text);

            return Err(match status.as_u16() {
                401 | 403 => AlchemyError::AuthError,
                429 => AlchemyError::RateLimit,
                code @ 500..=599 => AlchemyError::ServerError { status: code },
                _ => AlchemyError::ApiError {
                    message: format!("HTTP {}: {}", status, text),
                },
            });
        }

        let body = response.text().await?;
        let parsed: JsonRpcResponse<T> = serde_json::from_str(&body).map_err(|e| {
            let sample: String = body.chars().take(500).collect();
            error!("❌ Failed to parse {} response: {} (sample: {})", request.method, e, sample);
            AlchemyError::JsonError(e)
        })?;

        if let Some(rpc_error) = parsed.error {
            return Err(AlchemyError::RpcError {
                code: rpc_error.code,
                message: rpc_error.message,
            });
        }

        parsed.result.ok_or_else(|| AlchemyError::ParseError {
            message: format!("{} response carried neither result nor error", request.method),
        })
    }
}

fn to_source_error(err: AlchemyError) -> SwapError {
    SwapError::Source(err.to_string())
}

#[async_trait]
impl TransferSource for AlchemyClient {
    async fn fetch_transfers(
        &self,
        wallet: &str,
        chain: EvmChain,
        from_block: u64,
        to_block: u64,
        direction: TransferDirection,
    ) -> trade_core::Result<Vec<RawTransfer>> {
        let transfers = self
            .get_asset_transfers(wallet, chain, from_block, to_block, direction)
            .await
            .map_err(to_source_error)?;

        Ok(transfers.into_iter().map(AssetTransfer::into_raw).collect())
    }
}

#[async_trait]
impl ChainTipSource for AlchemyClient {
    async fn chain_tip(&self, chain: EvmChain) -> trade_core::Result<u64> {
        self.block_number(chain).await.map_err(to_source_error)
    }
}
