//! Format checks applied before anything reaches the ledger.
//!
//! These only look at shape. Signature validity is decided by whichever
//! authenticator the caller plugs in.

use std::time::Duration;

/// Default tolerance for [`validate_timestamp_window`].
pub const DEFAULT_TIMESTAMP_WINDOW: Duration = Duration::from_secs(300);

const MIN_SIGNATURE_LEN: usize = 64;

/// `0x` followed by exactly 40 hex digits, either case.
pub fn validate_wallet_address(wallet: &str) -> bool {
    match wallet.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub fn validate_signature_format(signature: &str) -> bool {
    signature.len() >= MIN_SIGNATURE_LEN
}

/// `timestamp` (unix millis) lies within `window` of now, in either direction.
pub fn validate_timestamp_window(timestamp: u64, window: Duration) -> bool {
    let now = crate::now_millis();
    let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
    now.abs_diff(timestamp) <= window_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address() {
        assert!(validate_wallet_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!validate_wallet_address("742d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!validate_wallet_address("0x742d35Cc6634C0532925a3b844Bc454e4438f44"));
        assert!(!validate_wallet_address("0xZZ2d35Cc6634C0532925a3b844Bc454e4438f44e"));
        assert!(!validate_wallet_address(""));
    }

    #[test]
    fn test_signature_format() {
        assert!(validate_signature_format(&"ab".repeat(32)));
        assert!(!validate_signature_format("short"));
        assert!(!validate_signature_format(""));
    }

    #[test]
    fn test_timestamp_window() {
        let now = crate::now_millis();
        assert!(validate_timestamp_window(now, DEFAULT_TIMESTAMP_WINDOW));
        assert!(validate_timestamp_window(now - 100_000, DEFAULT_TIMESTAMP_WINDOW));
        assert!(!validate_timestamp_window(now - 600_000, DEFAULT_TIMESTAMP_WINDOW));
        assert!(!validate_timestamp_window(now + 600_000, DEFAULT_TIMESTAMP_WINDOW));
    }
}
