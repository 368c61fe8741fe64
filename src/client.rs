//! marketdata.app API client
//!
//! One thin method per endpoint: each assembles query parameters, issues a
//! single authenticated GET, counts the call, and routes the response through
//! the normalizer. The two cache-aware endpoints (options chains and options
//! quotes) consult the cache store first and short-circuit on a hit.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::debug;

use crate::cache::{CacheError, CacheStore, RequestSignature, STATUS_CACHE_HIT};
use crate::params::{
    BasicParams, BulkCandlesOptions, FromToParams, OptionsChainParams, OptionsQuoteParams,
    StockCandlesOptions,
};
use crate::response::{normalize, Output, Payload};

/// Base URL of the marketdata.app API
pub const BASE_URL: &str = "https://api.marketdata.app/v1/";

/// Environment variable holding the API token
const API_KEY_ENV: &str = "MARKET_DATA_API_KEY";

/// Cache sub-directory for options-chain responses
const OPTIONS_CHAIN_SUBDIR: &str = "options_chain";

/// Cache sub-directory for options-quotes responses
const OPTIONS_QUOTES_SUBDIR: &str = "options_quotes";

/// Errors that can occur when calling the API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Cache read/write error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// No API token configured
    #[error("MARKET_DATA_API_KEY is not set")]
    MissingApiKey,
}

/// Client for the marketdata.app API.
///
/// Each instance owns its cache store and call counter; nothing is shared
/// across instances. The call counter tracks quota usage for observability
/// and enforces nothing.
#[derive(Debug)]
pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: CacheStore,
    api_calls: AtomicU64,
}

impl MarketDataClient {
    /// Creates a client with the default base URL and cache location
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            api_key: api_key.into(),
            cache: CacheStore::new(),
            api_calls: AtomicU64::new(0),
        }
    }

    /// Creates a client from the `MARKET_DATA_API_KEY` environment variable
    pub fn from_env() -> Result<Self, ClientError> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(Self::new(key)),
            _ => Err(ClientError::MissingApiKey),
        }
    }

    /// Replaces the base URL (trailing slash expected); useful for testing
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Replaces the cache store, e.g. to relocate the root or set a TTL
    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the underlying HTTP client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Number of transport calls issued by this instance
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::Relaxed)
    }

    /// The cache store owned by this client
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Issues one authenticated GET and returns the raw status and body
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<(u16, String), ClientError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .query(query)
            .send()
            .await?;
        self.api_calls.fetch_add(1, Ordering::Relaxed);

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// One endpoint call: GET, count, normalize
    async fn fetch(
        &self,
        path: String,
        query: Vec<(String, String)>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let url = format!("{}{}", self.base_url, path);
        let (status, body) = self.get(&url, &query).await?;
        Ok(normalize(status, &body, output))
    }

    /// Computes the cache key for a signature and checks the store
    fn check_cache(
        &self,
        sub_dir: &str,
        signature: &RequestSignature,
    ) -> Result<(Payload, u16, String), CacheError> {
        if sub_dir.is_empty() {
            return Err(CacheError::SubDirRequired);
        }
        let key = signature.fingerprint();
        let (payload, status) = self.cache.lookup(sub_dir, &key)?;
        Ok((payload, status, key))
    }

    /// GET /v1/funds/candles/{resolution}/{symbol}/
    pub async fn fetch_fund_candles(
        &self,
        resolution: &str,
        symbol: &str,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        push_columns(&mut query, columns);
        self.fetch(format!("funds/candles/{resolution}/{symbol}/"), query, output)
            .await
    }

    /// GET /v1/indices/candles/{resolution}/{symbol}/
    pub async fn fetch_index_candles(
        &self,
        resolution: &str,
        symbol: &str,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        push_columns(&mut query, columns);
        self.fetch(
            format!("indices/candles/{resolution}/{symbol}/"),
            query,
            output,
        )
        .await
    }

    /// GET /v1/indices/quotes/{symbol}/
    pub async fn fetch_index_quote(
        &self,
        symbol: &str,
        basic: Option<&BasicParams>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, None);
        push_columns(&mut query, columns);
        self.fetch(format!("indices/quotes/{symbol}/"), query, output)
            .await
    }

    /// GET /v1/markets/status/
    pub async fn fetch_markets_status(
        &self,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        country: &str,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        query.push(("country".to_string(), country.to_string()));
        self.fetch("markets/status/".to_string(), query, output).await
    }

    /// GET /v1/options/chain/{underlying}/
    ///
    /// Cache-aware: with `use_cache`, a prior non-empty result for the same
    /// parameters is returned without any transport call, and a miss is
    /// persisted after normalization whatever shape came back.
    pub async fn fetch_options_chain(
        &self,
        params: &OptionsChainParams,
        use_cache: bool,
    ) -> Result<(Payload, u16), ClientError> {
        let cache_key = if use_cache {
            let signature = params.signature("options_chain");
            let (cached, status, key) = self.check_cache(OPTIONS_CHAIN_SUBDIR, &signature)?;
            if status == STATUS_CACHE_HIT {
                debug!("returning cached options chain for {key}");
                return Ok((cached, status));
            }
            Some(key)
        } else {
            None
        };

        let (payload, status) = self
            .fetch(
                format!("options/chain/{}/", params.underlying),
                params.query_pairs(),
                params.output,
            )
            .await?;

        if let Some(key) = cache_key {
            self.cache.save(&payload, &key, OPTIONS_CHAIN_SUBDIR)?;
        }
        Ok((payload, status))
    }

    /// GET /v1/options/expirations/{underlying}/
    pub async fn fetch_options_expirations(
        &self,
        underlying: &str,
        basic: Option<&BasicParams>,
        strike: Option<f64>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, None);
        if let Some(strike) = strike {
            query.push(("strike".to_string(), strike.to_string()));
        }
        push_columns(&mut query, columns);
        self.fetch(format!("options/expirations/{underlying}/"), query, output)
            .await
    }

    /// GET /v1/options/quotes/{optionSymbol}/
    ///
    /// Cache-aware: with `use_cache`, a prior non-empty result short-circuits
    /// the transport call; only tabular payloads are persisted on a miss.
    pub async fn fetch_options_quotes(
        &self,
        params: &OptionsQuoteParams,
        use_cache: bool,
    ) -> Result<(Payload, u16), ClientError> {
        let cache_key = if use_cache {
            let signature = params.signature("options_quotes");
            let (cached, status, key) = self.check_cache(OPTIONS_QUOTES_SUBDIR, &signature)?;
            if status == STATUS_CACHE_HIT {
                debug!("returning cached options quotes for {key}");
                return Ok((cached, status));
            }
            Some(key)
        } else {
            None
        };

        let (payload, status) = self
            .fetch(
                format!("options/quotes/{}/", params.option_symbol),
                params.query_pairs(),
                params.output,
            )
            .await?;

        if let Some(key) = cache_key {
            if matches!(payload, Payload::Table(_)) {
                self.cache.save(&payload, &key, OPTIONS_QUOTES_SUBDIR)?;
            }
        }
        Ok((payload, status))
    }

    /// GET /v1/options/strikes/{underlying}/
    pub async fn fetch_options_strikes(
        &self,
        underlying: &str,
        basic: Option<&BasicParams>,
        expiration: Option<NaiveDate>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, None);
        if let Some(expiration) = expiration {
            query.push((
                "expiration".to_string(),
                expiration.format("%Y-%m-%d").to_string(),
            ));
        }
        push_columns(&mut query, columns);
        self.fetch(format!("options/strikes/{underlying}/"), query, output)
            .await
    }

    /// GET /v1/stocks/bulkcandles/daily/
    ///
    /// The service only supports daily resolution for bulk candles.
    pub async fn fetch_bulk_stock_candles(
        &self,
        symbols: &[&str],
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        options: &BulkCandlesOptions,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        query.extend(options.query_pairs());
        query.push(("symbols".to_string(), symbols.join(",")));
        self.fetch("stocks/bulkcandles/daily/".to_string(), query, output)
            .await
    }

    /// GET /v1/stocks/bulkquotes/
    pub async fn fetch_bulk_stock_quotes(
        &self,
        symbols: &[&str],
        basic: Option<&BasicParams>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, None);
        push_columns(&mut query, columns);
        query.push(("symbols".to_string(), symbols.join(",")));
        self.fetch("stocks/bulkquotes/".to_string(), query, output).await
    }

    /// GET /v1/stocks/candles/{resolution}/{symbol}/
    pub async fn fetch_stock_candles(
        &self,
        symbol: &str,
        resolution: &str,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        options: &StockCandlesOptions,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        query.extend(options.query_pairs());
        self.fetch(
            format!("stocks/candles/{resolution}/{symbol}/"),
            query,
            output,
        )
        .await
    }

    /// GET /v1/stocks/earnings/{symbol}/
    pub async fn fetch_earnings(
        &self,
        symbol: &str,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        report: Option<&str>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, from_to);
        if let Some(report) = report {
            query.push(("report".to_string(), report.to_string()));
        }
        push_columns(&mut query, columns);
        self.fetch(format!("stocks/earnings/{symbol}/"), query, output)
            .await
    }

    /// GET /v1/stocks/news/{symbol}/
    pub async fn fetch_stock_news(
        &self,
        symbol: &str,
        basic: Option<&BasicParams>,
        from_to: Option<&FromToParams>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let query = collect_query(basic, from_to);
        self.fetch(format!("stocks/news/{symbol}/"), query, output).await
    }

    /// GET /v1/stocks/quotes/{symbol}/
    pub async fn fetch_stock_quote(
        &self,
        symbol: &str,
        basic: Option<&BasicParams>,
        columns: Option<&str>,
        output: Output,
    ) -> Result<(Payload, u16), ClientError> {
        let mut query = collect_query(basic, None);
        push_columns(&mut query, columns);
        self.fetch(format!("stocks/quotes/{symbol}/"), query, output)
            .await
    }
}

fn collect_query(
    basic: Option<&BasicParams>,
    from_to: Option<&FromToParams>,
) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(basic) = basic {
        query.extend(basic.query_pairs());
    }
    if let Some(from_to) = from_to {
        query.extend(from_to.query_pairs());
    }
    query
}

fn push_columns(query: &mut Vec<(String, String)>, columns: Option<&str>) {
    if let Some(columns) = columns {
        query.push(("columns".to_string(), columns.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use serde_json::json;
    use tempfile::TempDir;

    /// Connection-refused base URL: any transport attempt fails fast
    const DEAD_URL: &str = "http://127.0.0.1:9/";

    fn create_test_client() -> (MarketDataClient, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = MarketDataClient::new("test-token")
            .with_base_url(DEAD_URL)
            .with_cache(CacheStore::with_root(temp_dir.path().to_path_buf()));
        (client, temp_dir)
    }

    fn chain_table() -> Table {
        Table::from_json(&json!({
            "optionSymbol": ["SPY240119C00450000"],
            "strike": [450.0],
            "bid": [2.5],
            "ask": [2.6],
        }))
        .expect("chain table should build")
    }

    #[tokio::test]
    async fn test_cached_options_chain_short_circuits_transport() {
        let (client, _temp_dir) = create_test_client();
        let params = OptionsChainParams::new("SPY");

        // Seed the cache under the key the client will compute
        let key = params.signature("options_chain").fingerprint();
        client
            .cache()
            .save(&Payload::Table(chain_table()), &key, "options_chain")
            .expect("seed save should succeed");

        let (payload, status) = client
            .fetch_options_chain(&params, true)
            .await
            .expect("cached fetch should succeed without transport");

        assert_eq!(status, STATUS_CACHE_HIT);
        assert_eq!(payload.as_table().map(Table::rows), Some(1));
        assert_eq!(client.api_calls(), 0, "hit must not touch the transport");
    }

    #[tokio::test]
    async fn test_options_chain_miss_reaches_transport() {
        let (client, _temp_dir) = create_test_client();
        let params = OptionsChainParams::new("SPY");

        let result = client.fetch_options_chain(&params, true).await;

        assert!(matches!(result, Err(ClientError::Http(_))));
        assert_eq!(client.api_calls(), 0, "failed send is not a counted call");
    }

    #[tokio::test]
    async fn test_use_cache_false_bypasses_seeded_cache() {
        let (client, _temp_dir) = create_test_client();
        let params = OptionsChainParams::new("SPY");

        let key = params.signature("options_chain").fingerprint();
        client
            .cache()
            .save(&Payload::Table(chain_table()), &key, "options_chain")
            .expect("seed save should succeed");

        // Bypassing the cache forces a transport call, which fails here
        let result = client.fetch_options_chain(&params, false).await;
        assert!(matches!(result, Err(ClientError::Http(_))));
    }

    #[tokio::test]
    async fn test_cached_options_quotes_short_circuits_transport() {
        let (client, _temp_dir) = create_test_client();
        let params = OptionsQuoteParams::new("SPY240119C00450000");

        let key = params.signature("options_quotes").fingerprint();
        client
            .cache()
            .save(&Payload::Table(chain_table()), &key, "options_quotes")
            .expect("seed save should succeed");

        let (payload, status) = client
            .fetch_options_quotes(&params, true)
            .await
            .expect("cached fetch should succeed without transport");

        assert_eq!(status, STATUS_CACHE_HIT);
        assert!(matches!(payload, Payload::Table(_)));
        assert_eq!(client.api_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_cached_result_is_not_a_hit() {
        let (client, _temp_dir) = create_test_client();
        let params = OptionsQuoteParams::new("SPY240119C00450000");

        let key = params.signature("options_quotes").fingerprint();
        client
            .cache()
            .save(&Payload::Table(Table::new()), &key, "options_quotes")
            .expect("seed save should succeed");

        // An empty cached table classifies as no-data, so the client goes to
        // the transport, which is unreachable in tests
        let result = client.fetch_options_quotes(&params, true).await;
        assert!(matches!(result, Err(ClientError::Http(_))));
    }

    #[test]
    fn test_from_env_requires_the_token() {
        std::env::remove_var(API_KEY_ENV);
        assert!(matches!(
            MarketDataClient::from_env(),
            Err(ClientError::MissingApiKey)
        ));

        std::env::set_var(API_KEY_ENV, "token-123");
        assert!(MarketDataClient::from_env().is_ok());
        std::env::remove_var(API_KEY_ENV);
    }
}
