use log::debug;
use rand::Rng;
use reqwest::{header, Client, Proxy, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use eyre::Result;

/// Fixed balance endpoint; the address is appended as a path segment.
pub const DEFAULT_BASE_URL: &str = "https://api.neoscan.io/api/main_net/v1/get_balance/";

// Rotated per attempt so repeated lookups don't present a constant client.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:126.0) Gecko/20100101 Firefox/126.0",
];

/// One asset entry in a balance response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset_symbol: String,
    pub amount: f64,
}

/// One API response for an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub address: String,
    pub balance: Vec<AssetBalance>,
}

/// Failure modes of a single lookup.
///
/// The first four kinds are transient and drive the retry loop; `Exhausted`
/// is the permanent per-address outcome after the retry ceiling; `Other`
/// covers everything that must not be retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("proxy error: {0}")]
    Proxy(#[source] reqwest::Error),
    #[error("connection error: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("unparseable response body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
    #[error(transparent)]
    Other(reqwest::Error),
}

impl FetchError {
    /// Whether the retry policy applies to this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Proxy(_)
                | FetchError::Connection(_)
                | FetchError::Status(_)
                | FetchError::Decode(_)
        )
    }

    /// Whether this failure must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Other(_))
    }
}

/// Attempt ceiling and randomized wait bounds applied before each retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub wait_min: Duration,
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            wait_min: Duration::from_secs(30),
            wait_max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Uniformly random wait in [wait_min, wait_max].
    pub fn next_delay(&self) -> Duration {
        let lo = self.wait_min.as_millis() as u64;
        let hi = self.wait_max.as_millis() as u64;
        if hi <= lo {
            return self.wait_min;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}

/// Configuration for the balance fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub base_url: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            proxy: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Performs one balance lookup per address with bounded retries.
pub struct BalanceFetcher {
    client: Client,
    config: FetcherConfig,
}

impl BalanceFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout);

        if let Some(url) = &config.proxy {
            // One proxy for both schemes.
            let proxy =
                Proxy::all(url).map_err(|e| eyre::eyre!("invalid proxy URL {}: {}", url, e))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        Ok(Self { client, config })
    }

    /// Fetch the balance record for a single address.
    ///
    /// Transient failures retry with a randomized wait until the attempt
    /// ceiling; exhaustion and non-transient failures are returned to the
    /// caller.
    pub async fn fetch(&self, address: &str) -> Result<BalanceRecord, FetchError> {
        let address = address.trim();
        let url = format!("{}{}", self.config.base_url, address);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.attempt(&url).await {
                Ok(record) => return Ok(record),
                Err(err) if err.is_transient() => {
                    if attempt >= self.config.retry.max_attempts {
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.config.retry.next_delay();
                    debug!(
                        "attempt {} for {} failed ({}), retrying in {:?}",
                        attempt, address, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<BalanceRecord, FetchError> {
        let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];

        let response = self
            .client
            .get(url)
            .header(header::USER_AGENT, ua)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if response.status() != StatusCode::OK {
            return Err(FetchError::Status(response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes).map_err(FetchError::Decode)
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_connect() || err.is_timeout() {
            if self.config.proxy.is_some() {
                FetchError::Proxy(err)
            } else {
                FetchError::Connection(err)
            }
        } else {
            FetchError::Other(err)
        }
    }
}
