//! Exchange rates for displaying donations in other currencies
//!
//! Rates come from an open.er-api.com style endpoint
//! (`GET {base_url}/latest/{BASE}` returning `{ result, base_code, rates }`)
//! and are cached per base currency. The numbers are for display only; no
//! money moves at these rates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate API returned an error: {0}")]
    Upstream(String),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("No rate from {from} to {to}")]
    MissingRate { from: String, to: String },
}

/// Rates from one base currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub base: String,
    pub rates: HashMap<String, f64>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub amount_minor: i64,
    pub converted_minor: i64,
}

#[async_trait]
pub trait RateSource: Send + Sync {
    async fn latest(&self, base: &str) -> Result<RateTable, ExchangeError>;
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub cache_ttl_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://open.er-api.com/v6".to_string(),
            cache_ttl_seconds: 3600,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default)]
    base_code: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

#[derive(Debug)]
pub struct OpenExchangeRateSource {
    http: reqwest::Client,
    base_url: String,
}

impl OpenExchangeRateSource {
    pub fn new(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RateSource for OpenExchangeRateSource {
    async fn latest(&self, base: &str) -> Result<RateTable, ExchangeError> {
        let url = format!("{}/latest/{}", self.base_url, base);
        let resp = self.http.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ExchangeError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }

        let body: LatestResponse = resp.json().await?;
        if body.result != "success" {
            return Err(ExchangeError::Upstream(
                body.error_type.unwrap_or(body.result),
            ));
        }

        Ok(RateTable {
            base: body.base_code,
            rates: body.rates,
            fetched_at: Utc::now(),
        })
    }
}

/// Normalizes and checks an ISO 4217 code
pub fn normalize_currency(code: &str) -> Result<String, ExchangeError> {
    let code = code.trim();
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ExchangeError::InvalidCurrency(code.to_string()))
    }
}

/// Decimal places of a currency's minor unit
pub fn minor_unit_exponent(code: &str) -> i32 {
    match code {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Cached rate lookups
#[derive(Clone)]
pub struct ExchangeRateService {
    source: Arc<dyn RateSource>,
    cache: Cache<String, Arc<RateTable>>,
}

impl ExchangeRateService {
    pub fn new(source: Arc<dyn RateSource>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(64)
            .time_to_live(ttl)
            .build();

        Self { source, cache }
    }

    /// Rates for `base`, fetched at most once per TTL
    ///
    /// Concurrent misses for the same base wait on a single upstream request.
    /// Failures are not cached.
    pub async fn rates(&self, base: &str) -> Result<Arc<RateTable>, ExchangeError> {
        let base = normalize_currency(base)?;

        self.cache
            .try_get_with(base.clone(), async {
                debug!(base = %base, "Fetching exchange rates");
                self.source.latest(&base).await.map(Arc::new)
            })
            .await
            .map_err(|shared| {
                Arc::try_unwrap(shared)
                    .unwrap_or_else(|shared| ExchangeError::Upstream(shared.to_string()))
            })
    }

    /// Converts minor units of `from` into minor units of `to`, rounding to
    /// the nearest unit
    pub async fn convert(
        &self,
        amount_minor: i64,
        from: &str,
        to: &str,
    ) -> Result<Conversion, ExchangeError> {
        let from = normalize_currency(from)?;
        let to = normalize_currency(to)?;

        let rate = if from == to {
            1.0
        } else {
            let table = self.rates(&from).await?;
            *table.rates.get(&to).ok_or_else(|| ExchangeError::MissingRate {
                from: from.clone(),
                to: to.clone(),
            })?
        };

        let scale = 10f64.powi(minor_unit_exponent(&to) - minor_unit_exponent(&from));
        let converted_minor = (amount_minor as f64 * rate * scale).round() as i64;

        Ok(Conversion {
            from,
            to,
            rate,
            amount_minor,
            converted_minor,
        })
    }
}
