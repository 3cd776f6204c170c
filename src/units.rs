use alloy_primitives::utils::{format_units, parse_units, UnitsError};
use alloy_primitives::U256;

/// Decimals of the chain's native coin
pub const NATIVE_DECIMALS: u8 = 18;

/// Human-readable decimal string with trailing fractional zeros trimmed.
pub fn format_amount(value: U256, decimals: u8) -> String {
    let formatted = format_units(value, decimals).unwrap_or_else(|_| value.to_string());
    match formatted.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{whole}.0")
            } else {
                format!("{whole}.{frac}")
            }
        }
        None => formatted,
    }
}

/// Parse a decimal string like `"0.001"` into smallest units.
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256, UnitsError> {
    Ok(parse_units(amount.trim(), decimals)?.get_absolute())
}
