pub mod dataset;
pub mod domain;
pub mod features;
pub mod ingest;
pub mod model;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::time::Duration;

    pub const DEFAULT_MODEL_DIR: &str = "models";
    pub const DEFAULT_PORT: u16 = 5000;
    pub const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_MARKET_DATA_TIMEOUT_SECS: u64 = 30;

    /// Raw values are kept as strings and parsed by the binary that needs them, so a bad
    /// trainer-only setting never stops the api (and vice versa).
    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub model_dir: PathBuf,
        pub port: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: String,
        pub market_data_timeout_secs: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                model_dir: non_empty_var("MODEL_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
                port: non_empty_var("PORT"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MARKET_DATA_BASE_URL.to_string()),
                market_data_timeout_secs: non_empty_var("MARKET_DATA_TIMEOUT_SECS"),
            })
        }

        pub fn port(&self) -> anyhow::Result<u16> {
            match self.port.as_deref() {
                Some(s) => s
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("PORT is not a valid port: {s}")),
                None => Ok(DEFAULT_PORT),
            }
        }

        pub fn market_data_timeout(&self) -> anyhow::Result<Duration> {
            let secs = match self.market_data_timeout_secs.as_deref() {
                Some(s) => s
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("MARKET_DATA_TIMEOUT_SECS is not a number: {s}"))?,
                None => DEFAULT_MARKET_DATA_TIMEOUT_SECS,
            };
            Ok(Duration::from_secs(secs))
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

}
