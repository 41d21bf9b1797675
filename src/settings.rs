use std::path::PathBuf;
use std::time::Duration;

/// Matcher node configuration. Read from the environment; every field has
/// a default except the wallet seed.
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    /// Base58 address expected to own the matcher wallet. When set, the
    /// derived wallet address must match it.
    pub account: Option<String>,
    /// Fee carried by every emitted exchange transaction.
    pub order_match_tx_fee: u64,
    /// Lower bound on the matcher fee of accepted orders.
    pub min_order_fee: u64,
    /// Period of the expiry sweep across all books.
    pub order_cleanup_interval: Duration,
    /// Deadline for one placement or cancel validation.
    pub validation_timeout: Duration,
    /// Snapshot the book every this many journal events.
    pub snapshot_interval: u64,
    /// sled data directory.
    pub data_dir: PathBuf,
    /// Hex-encoded 32-byte matcher wallet seed.
    pub matcher_seed_hex: Option<String>,
    /// Activation height of the smart-account trading feature, if known
    /// ahead of chain state.
    pub smart_account_trading_height: Option<u64>,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        MatcherSettings {
            account: None,
            order_match_tx_fee: 300_000,
            min_order_fee: 300_000,
            order_cleanup_interval: Duration::from_millis(60_000),
            validation_timeout: Duration::from_millis(600_000),
            snapshot_interval: 1_000,
            data_dir: PathBuf::from("./matcher-data"),
            matcher_seed_hex: None,
            smart_account_trading_height: None,
        }
    }
}

impl MatcherSettings {
    pub fn from_env() -> Result<Self, String> {
        dotenv::dotenv().ok();
        let defaults = MatcherSettings::default();
        Ok(MatcherSettings {
            account: std::env::var("MATCHER_ACCOUNT").ok(),
            order_match_tx_fee: env_u64("MATCHER_ORDER_MATCH_TX_FEE", defaults.order_match_tx_fee)?,
            min_order_fee: env_u64("MATCHER_MIN_ORDER_FEE", defaults.min_order_fee)?,
            order_cleanup_interval: Duration::from_millis(env_u64(
                "MATCHER_ORDER_CLEANUP_INTERVAL_MS",
                defaults.order_cleanup_interval.as_millis() as u64,
            )?),
            validation_timeout: Duration::from_millis(env_u64(
                "MATCHER_VALIDATION_TIMEOUT_MS",
                defaults.validation_timeout.as_millis() as u64,
            )?),
            snapshot_interval: env_u64("MATCHER_SNAPSHOT_INTERVAL", defaults.snapshot_interval)?
                .max(1),
            data_dir: std::env::var("MATCHER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            matcher_seed_hex: std::env::var("MATCHER_SEED").ok(),
            smart_account_trading_height: match std::env::var("MATCHER_SMART_ACCOUNT_TRADING_HEIGHT")
            {
                Ok(raw) => Some(
                    raw.parse::<u64>()
                        .map_err(|_| "MATCHER_SMART_ACCOUNT_TRADING_HEIGHT must be an integer")?,
                ),
                Err(_) => None,
            },
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| format!("{} must be an integer, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = MatcherSettings::default();
        assert_eq!(settings.min_order_fee, 300_000);
        assert_eq!(settings.validation_timeout, Duration::from_millis(600_000));
        assert!(settings.snapshot_interval >= 1);
    }
}
