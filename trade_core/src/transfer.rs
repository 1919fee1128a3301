use crate::normalize::normalize_amount;
use crate::{is_valid_evm_address, is_valid_tx_hash, Result, SwapError, ZERO_ADDRESS};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Precision assumed when the source omits it (native asset precision)
pub const DEFAULT_DECIMALS: u32 = 18;
/// 10^77 is the largest power of ten below 2^256
pub const MAX_DECIMALS: u32 = 77;

/// Which side of a transfer the wallet is queried on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Wallet is the sender
    From,
    /// Wallet is the recipient
    To,
}

/// Transfer record as delivered by the upstream indexer.
///
/// Nothing here is trusted: amounts are strings in hex or decimal, precision may
/// be a hex string, a decimal string, a number or missing. Convert with
/// [`ValidatedTransfer::try_from_raw`] before doing arithmetic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: Option<String>,
    pub asset_symbol: Option<String>,
    pub token_address: Option<String>,
    #[serde(default)]
    pub precision: serde_json::Value,
    pub raw_value: Option<String>,
    pub category: String,
    pub block_number: Option<String>,
    pub block_timestamp: Option<String>,
    pub log_index: Option<u32>,
    pub unique_id: Option<String>,
}

/// Content-derived identity used to drop transfers seen by both directional queries
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransferIdentity {
    Explicit(String),
    Composite { tx_hash: String, from: String, to: String },
}

/// Strictly typed transfer with lower-cased addresses and an exact raw amount
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTransfer {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub symbol: String,
    /// Contract address, or [`ZERO_ADDRESS`] for the native asset
    pub token_address: String,
    pub decimals: u32,
    pub raw_value: BigUint,
    pub category: String,
    pub block_timestamp: DateTime<Utc>,
    pub log_index: Option<u32>,
    pub unique_id: Option<String>,
    /// Untouched source record, kept for the trade's audit payload
    pub raw: RawTransfer,
}

impl ValidatedTransfer {
    pub fn try_from_raw(raw: RawTransfer) -> Result<Self> {
        let tx_hash = raw.tx_hash.trim().to_lowercase();
        if !is_valid_tx_hash(&tx_hash) {
            return Err(invalid(&raw, format!("malformed tx hash '{}'", raw.tx_hash)));
        }

        let from = parse_address(&raw, "from", Some(raw.from.as_str()))?;
        let to = parse_address(&raw, "to", raw.to.as_deref())?;

        let token_address = match raw.token_address.as_deref().map(str::trim) {
            None | Some("") => ZERO_ADDRESS.to_string(),
            Some(address) => parse_address(&raw, "token address", Some(address))?,
        };

        let decimals = parse_precision(&raw.precision).map_err(|e| invalid(&raw, e))?;

        let raw_value = match raw.raw_value.as_deref() {
            Some(value) => parse_raw_value(value).map_err(|e| invalid(&raw, e))?,
            None => return Err(invalid(&raw, "missing raw value".to_string())),
        };

        let block_timestamp = match raw.block_timestamp.as_deref() {
            Some(ts) => DateTime::parse_from_rfc3339(ts.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| invalid(&raw, format!("bad block timestamp '{}': {}", ts, e)))?,
            None => return Err(invalid(&raw, "missing block timestamp".to_string())),
        };

        let symbol = raw
            .asset_symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("UNKNOWN")
            .to_string();

        Ok(Self {
            tx_hash,
            from,
            to,
            symbol,
            token_address,
            decimals,
            raw_value,
            category: raw.category.trim().to_lowercase(),
            block_timestamp,
            log_index: raw.log_index,
            unique_id: raw.unique_id.clone().filter(|id| !id.trim().is_empty()),
            raw,
        })
    }

    /// Explicit id when the source provides one, otherwise `(txHash, from, to)`
    pub fn identity(&self) -> TransferIdentity {
        match &self.unique_id {
            Some(id) => TransferIdentity::Explicit(id.clone()),
            None => TransferIdentity::Composite {
                tx_hash: self.tx_hash.clone(),
                from: self.from.clone(),
                to: self.to.clone(),
            },
        }
    }

    pub fn is_sent_by(&self, wallet: &str) -> bool {
        self.from == wallet
    }

    pub fn is_received_by(&self, wallet: &str) -> bool {
        self.to == wallet
    }

    pub fn touches_zero_address(&self) -> bool {
        self.from == ZERO_ADDRESS || self.to == ZERO_ADDRESS
    }

    pub fn normalized_amount(&self) -> Result<Decimal> {
        normalize_amount(&self.raw_value, self.decimals)
    }
}

fn invalid(raw: &RawTransfer, reason: String) -> SwapError {
    SwapError::InvalidTransfer(format!("tx {}: {}", raw.tx_hash, reason))
}

fn parse_address(raw: &RawTransfer, field: &str, value: Option<&str>) -> Result<String> {
    let address = value
        .map(|v| v.trim().to_lowercase())
        .ok_or_else(|| invalid(raw, format!("missing {} address", field)))?;
    if !is_valid_evm_address(&address) {
        return Err(invalid(raw, format!("malformed {} address '{}'", field, address)));
    }
    Ok(address)
}

/// Token precision given as hex string, decimal string, JSON number, or absent
pub fn parse_precision(value: &serde_json::Value) -> std::result::Result<u32, String> {
    let decimals = match value {
        serde_json::Value::Null => DEFAULT_DECIMALS,
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                DEFAULT_DECIMALS
            } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u32::from_str_radix(hex, 16)
                    .map_err(|e| format!("bad hex precision '{}': {}", s, e))?
            } else {
                s.parse::<u32>()
                    .map_err(|e| format!("bad precision '{}': {}", s, e))?
            }
        }
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| format!("bad numeric precision {}", n))?,
        other => return Err(format!("unsupported precision value {}", other)),
    };

    if decimals > MAX_DECIMALS {
        return Err(format!("precision {} out of range", decimals));
    }
    Ok(decimals)
}

/// Unsigned integer amount in `0x` hex or plain decimal notation
pub fn parse_raw_value(value: &str) -> std::result::Result<BigUint, String> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some("") => Some(BigUint::default()),
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None if value.chars().all(|c| c.is_ascii_digit()) && !value.is_empty() => {
            BigUint::parse_bytes(value.as_bytes(), 10)
        }
        None => None,
    };
    parsed.ok_or_else(|| format!("bad raw value '{}'", value))
}
