//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults.
//! Used by the target and tool config layers.
//!
//! ```ignore
//! use funcscope_core::env::{env_get, env_get_bool};
//!
//! let capacity: u32 = env_get("FUNCSCOPE_RING_CAPACITY", 4096);
//! let huge = env_get_bool("FUNCSCOPE_HUGEPAGES", true);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// Unparseable values fall back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean.
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true and
/// "0", "false", "no", "off" as false. Anything else, including unset,
/// returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Get environment variable as optional value.
///
/// `None` if unset or unparseable.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
