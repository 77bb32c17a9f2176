//! Roman numerals in standard subtractive notation.

use crate::error::{AssemblyError, Result};

pub const MAX_ROMAN: u32 = 3999;

const NUMERALS: &[(u32, &str)] = &[
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Convert `1..=3999` to a Roman numeral; anything else is rejected.
pub fn to_roman(value: u32) -> Result<String> {
    if value == 0 || value > MAX_ROMAN {
        return Err(AssemblyError::OrdinalOutOfRange(value));
    }
    let mut remaining = value;
    let mut out = String::new();
    for &(weight, symbol) in NUMERALS {
        while remaining >= weight {
            out.push_str(symbol);
            remaining -= weight;
        }
    }
    Ok(out)
}

/// Parse a canonical Roman numeral (case-insensitive). Non-canonical forms
/// such as `IIII` or `VX` yield `None`.
pub fn from_roman(text: &str) -> Option<u32> {
    let upper = text.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return None;
    }
    let mut rest = upper.as_str();
    let mut total = 0u32;
    for &(weight, symbol) in NUMERALS {
        while let Some(tail) = rest.strip_prefix(symbol) {
            total += weight;
            rest = tail;
        }
    }
    if !rest.is_empty() || total == 0 || total > MAX_ROMAN {
        return None;
    }
    // the greedy parse accepts a few non-canonical spellings; reject them
    match to_roman(total) {
        Ok(canonical) if canonical == upper => Some(total),
        _ => None,
    }
}
