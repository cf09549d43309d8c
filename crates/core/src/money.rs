//! Prices are kept in minor units (cents) and exchanged as decimal strings.

use crate::error::DomainError;

/// Parse a decimal amount (`"5"`, `"5.0"`, `"19.99"`) into minor units.
///
/// At most two fractional digits are accepted; negative amounts are rejected.
pub fn parse_minor_units(field: &str, raw: &str) -> Result<u64, DomainError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DomainError::validation(field, "can't be blank"));
    }

    let (whole, frac) = match raw.split_once('.') {
        Some((w, f)) => (w, f),
        None => (raw, ""),
    };

    let invalid = || DomainError::validation(field, "is not a number");

    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        if whole.starts_with('-') {
            return Err(DomainError::validation(field, "must be greater than or equal to 0"));
        }
        return Err(invalid());
    }
    if frac.len() > 2 {
        return Err(DomainError::validation(field, "must have at most two decimal places"));
    }

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    let mut cents: u64 = if frac.is_empty() { 0 } else { frac.parse().map_err(|_| invalid())? };
    if frac.len() == 1 {
        cents *= 10;
    }

    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(cents))
        .ok_or_else(|| DomainError::validation(field, "is too large"))
}

/// Render minor units as a two-decimal string (`1999` → `"19.99"`).
pub fn format_minor_units(amount: u64) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}
