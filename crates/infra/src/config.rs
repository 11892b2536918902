//! Process configuration, read from `BIZSUITE_*` environment variables.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::rates::{ExchangeRateSource, PlaceholderRateSource};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RATES_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";
pub const DEFAULT_RATES_TTL_SECS: u64 = 3600;
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{var} must be set when {because}")]
    Missing { var: &'static str, because: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSourceKind {
    Placeholder,
    Live,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatesConfig {
    pub source: RateSourceKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub ttl: Duration,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            source: RateSourceKind::Placeholder,
            api_key: None,
            base_url: DEFAULT_RATES_BASE_URL.to_string(),
            ttl: Duration::from_secs(DEFAULT_RATES_TTL_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub rates: RatesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            rates: RatesConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to dev defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIZSUITE_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                var: "BIZSUITE_BIND_ADDR",
                reason: e.to_string(),
            })?;

        let jwt_secret = get("BIZSUITE_JWT_SECRET").unwrap_or_else(|| {
            warn!("BIZSUITE_JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let source = match get("BIZSUITE_RATES_SOURCE").as_deref() {
            None | Some("placeholder") => RateSourceKind::Placeholder,
            Some("live") => RateSourceKind::Live,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "BIZSUITE_RATES_SOURCE",
                    reason: format!("expected `placeholder` or `live`, got `{other}`"),
                });
            }
        };

        let api_key = get("BIZSUITE_RATES_API_KEY");
        if source == RateSourceKind::Live && api_key.is_none() {
            return Err(ConfigError::Missing {
                var: "BIZSUITE_RATES_API_KEY",
                because: "BIZSUITE_RATES_SOURCE=live",
            });
        }

        let ttl = match get("BIZSUITE_RATES_TTL_SECS") {
            None => Duration::from_secs(DEFAULT_RATES_TTL_SECS),
            Some(raw) => Duration::from_secs(raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "BIZSUITE_RATES_TTL_SECS",
                reason: e.to_string(),
            })?),
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            rates: RatesConfig {
                source,
                api_key,
                base_url: get("BIZSUITE_RATES_BASE_URL").unwrap_or_else(|| DEFAULT_RATES_BASE_URL.to_string()),
                ttl,
            },
        })
    }
}

impl RatesConfig {
    /// Instantiate the configured rate source.
    pub fn rate_source(&self) -> Result<Arc<dyn ExchangeRateSource>, ConfigError> {
        match self.source {
            RateSourceKind::Placeholder => Ok(Arc::new(PlaceholderRateSource::default())),
            RateSourceKind::Live => self.live_source(),
        }
    }

    #[cfg(feature = "live-rates")]
    fn live_source(&self) -> Result<Arc<dyn ExchangeRateSource>, ConfigError> {
        let api_key = self.api_key.clone().ok_or(ConfigError::Missing {
            var: "BIZSUITE_RATES_API_KEY",
            because: "BIZSUITE_RATES_SOURCE=live",
        })?;
        let source = crate::rates::HttpRateSource::new(self.base_url.clone(), api_key, Duration::from_secs(10))
            .map_err(|e| ConfigError::Invalid {
                var: "BIZSUITE_RATES_SOURCE",
                reason: e.to_string(),
            })?;
        Ok(Arc::new(source))
    }

    #[cfg(not(feature = "live-rates"))]
    fn live_source(&self) -> Result<Arc<dyn ExchangeRateSource>, ConfigError> {
        Err(ConfigError::Invalid {
            var: "BIZSUITE_RATES_SOURCE",
            reason: "live rates require the `live-rates` feature".to_string(),
        })
    }
}
