//! Typed lookups over string property sources.
//!
//! Catalog configuration arrives as flat `key -> value` strings, either from a
//! property map handed to the catalog or from the process environment. These
//! helpers parse such values with strict validation and fall back to defaults
//! when a key is absent.

use crate::error::{Error, Result};

/// Returns the first value found for any of `keys`, in order.
pub fn first_present<F>(lookup: &F, keys: &[&str]) -> Option<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .copied()
        .find_map(|key| lookup(key).map(|value| (key.to_string(), value)))
}

/// Parses a positive integer property, returning `default` when none of the
/// keys is present.
///
/// # Errors
///
/// Returns a configuration error when the value is not a positive integer.
pub fn parse_positive_u64<F>(lookup: &F, keys: &[&str], default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some((key, raw)) = first_present(lookup, keys) else {
        return Ok(default);
    };

    let parsed = raw.trim().parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be a positive integer, got '{raw}'"
        )));
    }
    Ok(parsed)
}

/// Reads a non-empty string property.
///
/// Blank values are treated as absent.
pub fn non_empty_string<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    first_present(lookup, keys)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
