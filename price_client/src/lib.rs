// DefiLlama historical price client for chain native assets

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use retry_utils::{retry_with_backoff, RetryPolicy, RetryableError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use trade_core::{EvmChain, NativePriceSource, SwapError};

#[derive(Error, Debug)]
pub enum PriceClientError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid price data: {0}")]
    InvalidPriceData(String),
    #[error("Server error: HTTP {0}")]
    Server(u16),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("No price for {coin} near timestamp {timestamp}")]
    NoPriceData { coin: String, timestamp: i64 },
}

impl PriceClientError {
    fn retry_class(&self) -> RetryableError {
        match self {
            PriceClientError::RateLimit => RetryableError::RateLimit,
            PriceClientError::Server(_) => RetryableError::ServerError,
            PriceClientError::Http(e) if e.is_timeout() || e.is_connect() => RetryableError::Timeout,
            _ => RetryableError::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PriceClientError>;

#[derive(Debug, Clone)]
pub struct PriceClientConfig {
    /// DefiLlama coins API base URL
    pub base_url: String,
    pub request_timeout_seconds: u64,
    /// Accepted distance between the requested timestamp and the returned price point
    pub search_width: String,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    /// Lookups inside the same bucket share one cached price
    pub cache_bucket_seconds: i64,
    /// Cached prices kept before the oldest buckets are evicted
    pub cache_capacity: usize,
}

impl Default for PriceClientConfig {
    fn default() -> Self {
        Self::from(&config_manager::SystemConfig::default().pricing)
    }
}

impl From<&config_manager::PricingConfig> for PriceClientConfig {
    fn from(config: &config_manager::PricingConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            request_timeout_seconds: config.request_timeout_seconds,
            search_width: config.search_width.clone(),
            max_retries: 3,
            retry_base_delay_ms: 500,
            cache_bucket_seconds: 300,
            cache_capacity: 4096,
        }
    }
}

/// `GET /prices/historical/{timestamp}/{coins}` response
#[derive(Debug, Deserialize)]
pub struct HistoricalPriceResponse {
    #[serde(default)]
    pub coins: HashMap<String, CoinPrice>,
}

#[derive(Debug, Deserialize)]
pub struct CoinPrice {
    pub price: f64,
    pub symbol: Option<String>,
    pub timestamp: Option<i64>,
    pub confidence: Option<f64>,
}

#[derive(Clone)]
pub struct DefiLlamaPriceClient {
    config: PriceClientConfig,
    http_client: Client,
    retry: RetryPolicy,
    cache: Arc<Mutex<PriceCache>>,
}

impl DefiLlamaPriceClient {
    pub fn new(config: PriceClientConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        let retry = RetryPolicy::new(config.max_retries, config.retry_base_delay_ms);

        Ok(Self {
            config,
            http_client,
            retry,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// USD price of `coin` (e.g. `coingecko:ethereum`) at `timestamp`
    pub async fn historical_price(&self, coin: &str, timestamp: DateTime<Utc>) -> Result<Decimal> {
        let unix = timestamp.timestamp();
        let key = self.cache_key(coin, unix);

        if let Some(price) = self.cache.lock().await.get(&key).copied() {
            debug!("Price cache hit for {} at {}", coin, unix);
            return Ok(price);
        }

        let url = self.historical_url(coin, unix);
        let response = retry_with_backoff(
            || self.fetch(&url),
            &self.retry,
            PriceClientError::retry_class,
        )
        .await?;

        let price = extract_price(response, coin, unix)?;
        remember(&mut *self.cache.lock().await, key, price, self.config.cache_capacity);
        debug!("💲 {} at {} = {}", coin, unix, price);

        Ok(price)
    }

    fn cache_key(&self, coin: &str, unix: i64) -> (String, i64) {
        let bucket = unix.div_euclid(self.config.cache_bucket_seconds.max(1));
        (coin.to_string(), bucket)
    }

    fn historical_url(&self, coin: &str, unix: i64) -> String {
        format!(
            "{}/prices/historical/{}/{}?searchWidth={}",
            self.config.base_url.trim_end_matches('/'),
            unix,
            coin,
            self.config.search_width
        )
    }

    async fn fetch(&self, url: &str) -> Result<HistoricalPriceResponse> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<HistoricalPriceResponse>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        error!("❌ Price API error - Status: {}, Body: {}", status, text);
        Err(match status.as_u16() {
            429 => PriceClientError::RateLimit,
            code @ 500..=599 => PriceClientError::Server(code),
            _ => PriceClientError::InvalidPriceData(format!("HTTP {}: {}", status, text)),
        })
    }
}

type PriceCache = HashMap<(String, i64), Decimal>;

/// Insert a price, evicting the oldest bucket when the cache is full
fn remember(cache: &mut PriceCache, key: (String, i64), price: Decimal, capacity: usize) {
    if !cache.contains_key(&key) && cache.len() >= capacity.max(1) {
        let oldest = cache
            .keys()
            .min_by_key(|(_, bucket)| *bucket)
            .cloned();
        if let Some(oldest) = oldest {
            cache.remove(&oldest);
        }
    }
    cache.insert(key, price);
}

fn extract_price(response: HistoricalPriceResponse, coin: &str, unix: i64) -> Result<Decimal> {
    let entry = response
        .coins
        .get(coin)
        .ok_or_else(|| PriceClientError::NoPriceData {
            coin: coin.to_string(),
            timestamp: unix,
        })?;

    if let Some(confidence) = entry.confidence {
        if confidence < 0.5 {
            warn!("Low-confidence price for {} at {}: {}", coin, unix, confidence);
        }
    }

    let price = Decimal::try_from(entry.price)
        .map_err(|e| PriceClientError::InvalidPriceData(format!("{}: {}", entry.price, e)))?;
    if price <= Decimal::ZERO {
        return Err(PriceClientError::InvalidPriceData(format!(
            "non-positive price {} for {}",
            price, coin
        )));
    }

    Ok(price)
}

#[async_trait]
impl NativePriceSource for DefiLlamaPriceClient {
    async fn native_price_usd(
        &self,
        chain: EvmChain,
        timestamp: DateTime<Utc>,
    ) -> trade_core::Result<Decimal> {
        self.historical_price(chain.native_price_coin_id(), timestamp)
            .await
            .map_err(|e| SwapError::PriceLookup(format!("{} native price: {}", chain, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn client() -> DefiLlamaPriceClient {
        DefiLlamaPriceClient::new(PriceClientConfig::default()).unwrap()
    }

    fn response(body: &str) -> HistoricalPriceResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_historical_url() {
        assert_eq!(
            client().historical_url("coingecko:ethereum", 1_709_294_400),
            "https://coins.llama.fi/prices/historical/1709294400/coingecko:ethereum?searchWidth=4h"
        );
    }

    #[test]
    fn test_extract_price() {
        let body = r#"{"coins":{"coingecko:ethereum":{"symbol":"ETH","price":3412.57,"timestamp":1709294398,"confidence":0.99}}}"#;
        let price = extract_price(response(body), "coingecko:ethereum", 1_709_294_400).unwrap();
        assert_eq!(price, Decimal::from_str("3412.57").unwrap());
    }

    #[test]
    fn test_missing_coin_is_no_price() {
        let result = extract_price(response(r#"{"coins":{}}"#), "coingecko:binancecoin", 1);
        assert!(matches!(result, Err(PriceClientError::NoPriceData { .. })));
    }

    #[test]
    fn test_zero_price_rejected() {
        let body = r#"{"coins":{"coingecko:ethereum":{"price":0}}}"#;
        let result = extract_price(response(body), "coingecko:ethereum", 1);
        assert!(matches!(result, Err(PriceClientError::InvalidPriceData(_))));
    }

    #[test]
    fn test_cache_buckets() {
        let client = client();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().timestamp();
        assert_eq!(
            client.cache_key("coingecko:ethereum", start),
            client.cache_key("coingecko:ethereum", start + 299)
        );
        assert_ne!(
            client.cache_key("coingecko:ethereum", start),
            client.cache_key("coingecko:ethereum", start + 300)
        );
    }

    #[tokio::test]
    async fn test_cached_price_served_without_request() {
        let client = client();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let key = client.cache_key(EvmChain::Ethereum.native_price_coin_id(), at.timestamp());
        client.cache.lock().await.insert(key, Decimal::from(3400));

        let price = client.native_price_usd(EvmChain::Ethereum, at).await.unwrap();
        assert_eq!(price, Decimal::from(3400));
    }

    #[test]
    fn test_cache_evicts_oldest_bucket_when_full() {
        let mut cache = PriceCache::new();
        let eth = "coingecko:ethereum";
        remember(&mut cache, (eth.to_string(), 12), Decimal::from(3000), 2);
        remember(&mut cache, (eth.to_string(), 10), Decimal::from(2900), 2);
        // Refreshing an existing key never evicts
        remember(&mut cache, (eth.to_string(), 12), Decimal::from(3001), 2);
        assert_eq!(cache.len(), 2);

        remember(&mut cache, (eth.to_string(), 15), Decimal::from(3100), 2);
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key(&(eth.to_string(), 10)));
        assert_eq!(cache.get(&(eth.to_string(), 12)), Some(&Decimal::from(3001)));
        assert_eq!(cache.get(&(eth.to_string(), 15)), Some(&Decimal::from(3100)));
    }

    #[test]
    fn test_retry_classes() {
        assert_eq!(PriceClientError::RateLimit.retry_class(), RetryableError::RateLimit);
        assert_eq!(PriceClientError::Server(503).retry_class(), RetryableError::ServerError);
        assert_eq!(
            PriceClientError::NoPriceData { coin: "x".into(), timestamp: 0 }.retry_class(),
            RetryableError::Other
        );
    }
}
