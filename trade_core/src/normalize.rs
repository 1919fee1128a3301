use crate::{Result, SwapError};
use num_bigint::BigUint;
use rust_decimal::Decimal;

/// Largest fractional scale a `Decimal` can carry
const MAX_DECIMAL_SCALE: u32 = 28;
/// Width of the `Decimal` mantissa
const MAX_MANTISSA_BITS: u64 = 96;

/// Convert a raw integer token amount into units using the token's decimals.
///
/// The raw value stays an arbitrary-size integer until the final conversion, so
/// any amount whose digits fit the 96-bit `Decimal` mantissa is exact. Larger
/// magnitudes give up their least significant fractional digits (rounded half
/// up); an integer part that cannot be represented at all is an error.
pub fn normalize_amount(raw: &BigUint, decimals: u32) -> Result<Decimal> {
    let ten = BigUint::from(10u32);
    let five = BigUint::from(5u32);
    let mut mantissa = raw.clone();
    let mut scale = decimals;

    while scale > MAX_DECIMAL_SCALE || mantissa.bits() > MAX_MANTISSA_BITS {
        if scale == 0 {
            return Err(SwapError::Normalization(format!(
                "amount {} with {} decimals exceeds decimal range",
                raw, decimals
            )));
        }
        mantissa = (mantissa + &five) / &ten;
        scale -= 1;
    }

    let mantissa = i128::try_from(&mantissa)
        .map_err(|e| SwapError::Normalization(format!("mantissa conversion failed: {}", e)))?;

    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|amount| amount.normalize())
        .map_err(|e| SwapError::Normalization(format!("{} (raw {}, decimals {})", e, raw, decimals)))
}
