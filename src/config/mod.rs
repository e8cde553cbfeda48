use serde::Deserialize;
use std::path::Path;
use tokio::time::Duration;

use crate::Result;

const ENV_PREFIX: &str = "SWAPTRADER";
const DEFAULT_CONFIG_FILE: &str = "swaptrader.toml";

/// Bounded retry with optional exponential backoff
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay_ms: 2000,
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis((self.delay_ms as f64 * factor) as u64)
    }

    /// Run `op` until it succeeds or the attempts are exhausted
    pub async fn retry<T, E, F, Fut>(&self, what: &str, mut op: F) -> std::result::Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {}ms...",
                        what,
                        attempt,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Process configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub solana_rpc_url: String,
    pub wallet_private_key: Option<String>, // base58 keypair, absent for read-only runs
    pub jupiter_api_url: String,
    pub market_fee: f64,
    pub tick_interval_secs: u64,
    pub price_retention_hours: i64,
    pub jupiter_requests_per_minute: u32,
    pub slippage_bps: u16,
    pub rpc_retry: RetryPolicy,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/swaptrader".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            solana_rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            wallet_private_key: None,
            jupiter_api_url: "https://lite-api.jup.ag".to_string(),
            market_fee: 1.001,
            tick_interval_secs: 5,
            price_retention_hours: 48,
            jupiter_requests_per_minute: 60,
            slippage_bps: 50,
            rpc_retry: RetryPolicy::default(),
            log_filter: "swaptrader=info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `.env`, an optional TOML file and
    /// `SWAPTRADER__*` environment variables (later sources win)
    ///
    /// # Arguments
    /// * `path` - Config file; `swaptrader.toml` in the working directory when `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = settings.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    fn validate(&self) -> Result<()> {
        if self.market_fee < 1.0 {
            return Err(format!("market_fee must be >= 1.0, got {}", self.market_fee).into());
        }
        if self.tick_interval_secs == 0 {
            return Err("tick_interval_secs must be positive".into());
        }
        if self.price_retention_hours <= 0 {
            return Err("price_retention_hours must be positive".into());
        }
        if self.jupiter_requests_per_minute == 0 {
            return Err("jupiter_requests_per_minute must be positive".into());
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.market_fee, 1.001);
        assert_eq!(config.rpc_retry.max_attempts, 2);
        assert_eq!(config.tick_interval(), Duration::from_secs(5));
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_load_from_file_keeps_defaults_for_missing_keys() {
        let path = std::env::temp_dir().join(format!("swaptrader-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
redis_url = "redis://cache:6379"
market_fee = 1.002

[rpc_retry]
max_attempts = 4
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.market_fee, 1.002);
        assert_eq!(config.rpc_retry.max_attempts, 4);
        assert_eq!(config.rpc_retry.delay_ms, 2000);
        assert_eq!(config.slippage_bps, 50);
    }

    #[test]
    fn test_validation_rejects_discount_fee() {
        let config = AppConfig {
            market_fee: 0.99,
            ..Default::default()
        };
        tokio_test::assert_err!(config.validate());
    }

    #[test]
    fn test_backoff_delays() {
        let fixed = RetryPolicy::default();
        assert_eq!(fixed.delay_after(1), Duration::from_millis(2000));
        assert_eq!(fixed.delay_after(3), Duration::from_millis(2000));

        let exponential = RetryPolicy {
            max_attempts: 3,
            delay_ms: 100,
            backoff_multiplier: 2.0,
        };
        assert_eq!(exponential.delay_after(1), Duration::from_millis(100));
        assert_eq!(exponential.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retry_stops_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 2,
            delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: std::result::Result<(), String> = policy
            .retry("flaky call", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("boom".to_string())
            })
            .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_ms: 1,
            backoff_multiplier: 1.0,
        };
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: std::result::Result<u32, String> = policy
            .retry("flaky call", move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(2));
    }
}
