//! Batch orchestration over the API client
//!
//! The manager validates and normalizes request inputs (candle resolutions,
//! trading-date ranges) and fans batches of requests out concurrently through
//! one client, collapsing per-symbol outcomes into tables where possible.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Weekday};
use futures::future::join_all;
use regex::Regex;
use thiserror::Error;
use tracing::{error, warn};

use crate::client::{ClientError, MarketDataClient};
use crate::params::{FromToParams, OptionsChainParams, OptionsQuoteParams, StockCandlesOptions};
use crate::response::{Output, Payload};
use crate::table::Table;

/// Errors that can occur during batch orchestration
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The resolution string is not `<number>[MHWDY]`
    #[error("invalid resolution '{0}': expected <number>[MHWDY]")]
    InvalidResolution(String),

    /// The requested date range ends before it starts
    #[error("from_date cannot be after to_date")]
    InvertedDateRange,

    /// An underlying client error
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Batch layer over [`MarketDataClient`]
#[derive(Debug)]
pub struct MarketDataManager {
    client: MarketDataClient,
}

impl MarketDataManager {
    /// Creates a manager around an existing client
    pub fn new(client: MarketDataClient) -> Self {
        Self { client }
    }

    /// Creates a manager with a client configured from the environment
    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self::new(MarketDataClient::from_env()?))
    }

    /// The client this manager fans out through
    pub fn client(&self) -> &MarketDataClient {
        &self.client
    }

    /// Whether a candle resolution string is well-formed
    pub fn validate_resolution(resolution: &str) -> bool {
        static RESOLUTION_RE: OnceLock<Regex> = OnceLock::new();
        RESOLUTION_RE
            .get_or_init(|| Regex::new(r"^\d+[MHWDY]?$").expect("resolution pattern is valid"))
            .is_match(resolution)
    }

    /// Fetches candles for several symbols concurrently.
    ///
    /// The to-date defaults to today and is clamped to the last plausible
    /// trading day (never in the future, weekends pulled back to Friday, and
    /// a Monday before 18:00 local treated as "previous Friday", since daily
    /// candles are not final before the evening). Symbols whose fetch fails
    /// or returns no data map to `None`.
    pub async fn fetch_stock_candles(
        &self,
        symbols: &[&str],
        resolution: &str,
        from_date: NaiveDate,
        to_date: Option<NaiveDate>,
    ) -> Result<HashMap<String, Option<Table>>, ManagerError> {
        if !Self::validate_resolution(resolution) {
            error!("invalid resolution format: {resolution}");
            return Err(ManagerError::InvalidResolution(resolution.to_string()));
        }

        let now = Local::now();
        let to_date = to_date.unwrap_or_else(|| now.date_naive());
        if from_date > to_date {
            error!("from_date {from_date} is after to_date {to_date}");
            return Err(ManagerError::InvertedDateRange);
        }
        let to_date = clamp_trading_date(to_date, now);

        let range = FromToParams::range(from_date, to_date);
        let options = StockCandlesOptions::default();
        let fetches = symbols.iter().map(|&symbol| {
            let range = &range;
            let options = &options;
            async move {
                let outcome = self
                    .client
                    .fetch_stock_candles(symbol, resolution, None, Some(range), options, Output::Raw)
                    .await;
                (symbol.to_string(), outcome)
            }
        });

        let mut results = HashMap::new();
        for (symbol, outcome) in join_all(fetches).await {
            let table = reduce_candles(&symbol, outcome);
            results.insert(symbol, table);
        }
        Ok(results)
    }

    /// Fetches several options chains concurrently, preserving input order
    pub async fn fetch_option_chains(
        &self,
        params: &[OptionsChainParams],
        use_cache: bool,
    ) -> Vec<Result<(Payload, u16), ClientError>> {
        join_all(
            params
                .iter()
                .map(|p| self.client.fetch_options_chain(p, use_cache)),
        )
        .await
    }

    /// Fetches quotes for several option symbols concurrently, keyed by symbol
    pub async fn fetch_options_quotes(
        &self,
        params: &[OptionsQuoteParams],
        use_cache: bool,
    ) -> HashMap<String, Result<(Payload, u16), ClientError>> {
        let fetches = params.iter().map(|p| async {
            let outcome = self.client.fetch_options_quotes(p, use_cache).await;
            (p.option_symbol.clone(), outcome)
        });
        join_all(fetches).await.into_iter().collect()
    }
}

/// Pulls a to-date back to the last day daily data can exist for
fn clamp_trading_date(to_date: NaiveDate, now: DateTime<Local>) -> NaiveDate {
    let to_date = to_date.min(now.date_naive());
    let cutoff = NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN);
    match to_date.weekday() {
        Weekday::Sat => to_date - chrono::Duration::days(1),
        Weekday::Sun => to_date - chrono::Duration::days(2),
        Weekday::Mon if to_date == now.date_naive() && now.time() < cutoff => {
            to_date - chrono::Duration::days(3)
        }
        _ => to_date,
    }
}

/// Collapses one candle outcome into a table, logging degraded paths
fn reduce_candles(
    symbol: &str,
    outcome: Result<(Payload, u16), ClientError>,
) -> Option<Table> {
    let (payload, _status) = match outcome {
        Ok(result) => result,
        Err(err) => {
            error!("request failed for {symbol}: {err}");
            return None;
        }
    };

    match payload {
        Payload::Raw(body) => match body.get("s").and_then(|s| s.as_str()) {
            Some("no_data") => {
                warn!("no data available for {symbol}");
                None
            }
            Some("error") => {
                error!("error fetching data for {symbol}: {body}");
                None
            }
            _ => match Table::from_json(&body) {
                Ok(mut table) => {
                    table.drop_column("s");
                    Some(table)
                }
                Err(err) => {
                    error!("unexpected body shape for {symbol}: {err}");
                    None
                }
            },
        },
        Payload::Table(table) => Some(table),
        Payload::Text(_) => {
            error!("non-JSON body for {symbol}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("unambiguous local time")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn create_test_manager() -> (MarketDataManager, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = MarketDataClient::new("test-token")
            .with_base_url("http://127.0.0.1:9/")
            .with_cache(CacheStore::with_root(temp_dir.path().to_path_buf()));
        (MarketDataManager::new(client), temp_dir)
    }

    #[test]
    fn test_validate_resolution_accepts_number_and_unit() {
        for ok in ["1D", "5", "15", "2H", "1W", "3M", "1Y"] {
            assert!(MarketDataManager::validate_resolution(ok), "{ok} should pass");
        }
        for bad in ["D", "H1", "1X", "", "daily", "1.5D"] {
            assert!(!MarketDataManager::validate_resolution(bad), "{bad} should fail");
        }
    }

    #[test]
    fn test_clamp_saturday_to_friday() {
        // Sat Jan 13 2024 pulled back to Fri Jan 12
        let clamped = clamp_trading_date(date(2024, 1, 13), local(2024, 1, 15, 19));
        assert_eq!(clamped, date(2024, 1, 12));
    }

    #[test]
    fn test_clamp_sunday_to_friday() {
        let clamped = clamp_trading_date(date(2024, 1, 14), local(2024, 1, 15, 19));
        assert_eq!(clamped, date(2024, 1, 12));
    }

    #[test]
    fn test_clamp_monday_morning_to_previous_friday() {
        // Mon Jan 15 2024 at 09:00 local: daily candles not final yet
        let clamped = clamp_trading_date(date(2024, 1, 15), local(2024, 1, 15, 9));
        assert_eq!(clamped, date(2024, 1, 12));
    }

    #[test]
    fn test_clamp_monday_evening_stays_monday() {
        let clamped = clamp_trading_date(date(2024, 1, 15), local(2024, 1, 15, 19));
        assert_eq!(clamped, date(2024, 1, 15));
    }

    #[test]
    fn test_clamp_future_date_to_today() {
        // Tue Jan 16 2024: a future to-date collapses to today
        let clamped = clamp_trading_date(date(2024, 2, 1), local(2024, 1, 16, 10));
        assert_eq!(clamped, date(2024, 1, 16));
    }

    #[test]
    fn test_reduce_candles_no_data_and_error_map_to_none() {
        let no_data = Ok((Payload::Raw(json!({"s": "no_data"})), 203));
        assert!(reduce_candles("AAPL", no_data).is_none());

        let error = Ok((Payload::Raw(json!({"s": "error", "errmsg": "boom"})), 200));
        assert!(reduce_candles("AAPL", error).is_none());
    }

    #[test]
    fn test_reduce_candles_builds_table_and_drops_s() {
        let body = json!({"s": "ok", "t": [1, 2], "c": [10.0, 11.0]});
        let table = reduce_candles("AAPL", Ok((Payload::Raw(body), 200)))
            .expect("ok body should reduce to a table");

        assert_eq!(table.rows(), 2);
        assert!(table.column("s").is_none());
        assert!(table.column("c").is_some());
    }

    #[tokio::test]
    async fn test_fetch_stock_candles_rejects_bad_resolution() {
        let (manager, _temp_dir) = create_test_manager();

        let result = manager
            .fetch_stock_candles(&["AAPL"], "daily", date(2024, 1, 2), None)
            .await;

        assert!(matches!(result, Err(ManagerError::InvalidResolution(_))));
    }

    #[tokio::test]
    async fn test_fetch_stock_candles_rejects_inverted_range() {
        let (manager, _temp_dir) = create_test_manager();

        let result = manager
            .fetch_stock_candles(
                &["AAPL"],
                "1D",
                date(2024, 2, 1),
                Some(date(2024, 1, 1)),
            )
            .await;

        assert!(matches!(result, Err(ManagerError::InvertedDateRange)));
    }

    #[tokio::test]
    async fn test_fetch_stock_candles_maps_failed_symbols_to_none() {
        let (manager, _temp_dir) = create_test_manager();

        let results = manager
            .fetch_stock_candles(&["AAPL", "MSFT"], "1D", date(2024, 1, 2), Some(date(2024, 1, 31)))
            .await
            .expect("batch itself should succeed");

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("AAPL"), Some(&None));
        assert_eq!(results.get("MSFT"), Some(&None));
    }

    #[tokio::test]
    async fn test_fetch_options_quotes_serves_seeded_cache_per_symbol() {
        let (manager, _temp_dir) = create_test_manager();
        let params = vec![
            OptionsQuoteParams::new("SPY240119C00450000"),
            OptionsQuoteParams::new("SPY240119P00450000"),
        ];

        let table = Table::from_json(&json!({"bid": [2.5], "ask": [2.6]})).expect("table");
        for p in &params {
            let key = p.signature("options_quotes").fingerprint();
            manager
                .client()
                .cache()
                .save(&Payload::Table(table.clone()), &key, "options_quotes")
                .expect("seed save should succeed");
        }

        let results = manager.fetch_options_quotes(&params, true).await;

        assert_eq!(results.len(), 2);
        for p in &params {
            let outcome = results
                .get(&p.option_symbol)
                .expect("every symbol should be present");
            let (payload, status) = outcome.as_ref().expect("cached fetch should succeed");
            assert_eq!(*status, crate::cache::STATUS_CACHE_HIT);
            assert!(matches!(payload, Payload::Table(_)));
        }

        assert_eq!(manager.client().api_calls(), 0);
    }
}
