//! Parameter objects shared across API endpoints
//!
//! These mirror the service's query-string vocabulary: each object flattens
//! into query pairs for the transport and serializes recursively into a
//! request signature for the cache key. Unset optional fields are omitted
//! from the query but contribute explicit nulls to the signature, so two
//! equivalent calls always fingerprint identically.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::cache::{ParamValue, RequestSignature};
use crate::response::Output;

/// Renders a date the way the service expects it
fn date_str(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn push_if(pairs: &mut Vec<(String, String)>, name: &str, value: Option<String>) {
    if let Some(v) = value {
        pairs.push((name.to_string(), v));
    }
}

/// Options side filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSide {
    Call,
    Put,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionSide::Call => "call",
            OptionSide::Put => "put",
        }
    }
}

/// Moneyness filter for chain requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrikeRange {
    Itm,
    Otm,
    All,
}

impl StrikeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrikeRange::Itm => "itm",
            StrikeRange::Otm => "otm",
            StrikeRange::All => "all",
        }
    }
}

/// Parameters accepted by most endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicParams {
    /// Historical point-in-time lookup date
    pub lookup_date: Option<NaiveDate>,
    /// Output format for date fields (`timestamp`, `unix`, `spreadsheet`)
    pub date_format: Option<String>,
    /// Limit the number of rows returned
    pub limit: Option<u32>,
    /// Row offset for pagination
    pub offset: Option<u32>,
    /// Human-friendly column headers
    pub human: Option<bool>,
}

impl BasicParams {
    /// Flattens the set fields into query pairs
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_if(&mut pairs, "date", self.lookup_date.as_ref().map(date_str));
        push_if(&mut pairs, "dateformat", self.date_format.clone());
        push_if(&mut pairs, "limit", self.limit.map(|v| v.to_string()));
        push_if(&mut pairs, "offset", self.offset.map(|v| v.to_string()));
        push_if(&mut pairs, "human", self.human.map(|v| v.to_string()));
        pairs
    }

    /// Serializes every field (set or not) for fingerprinting
    pub fn signature_value(&self) -> ParamValue {
        let mut fields = BTreeMap::new();
        fields.insert("lookup_date".to_string(), self.lookup_date.into());
        fields.insert("date_format".to_string(), self.date_format.clone().into());
        fields.insert("limit".to_string(), self.limit.into());
        fields.insert("offset".to_string(), self.offset.into());
        fields.insert("human".to_string(), self.human.into());
        ParamValue::Object(fields)
    }
}

/// Date-range parameters for historical endpoints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FromToParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Number of candles counting back from `to` (alternative to `from`)
    pub countback: Option<u32>,
}

impl FromToParams {
    /// Convenience constructor for a closed date range
    pub fn range(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            countback: None,
        }
    }

    /// Flattens the set fields into query pairs
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_if(&mut pairs, "from", self.from.as_ref().map(date_str));
        push_if(&mut pairs, "to", self.to.as_ref().map(date_str));
        push_if(&mut pairs, "countback", self.countback.map(|v| v.to_string()));
        pairs
    }

    /// Serializes every field (set or not) for fingerprinting
    pub fn signature_value(&self) -> ParamValue {
        let mut fields = BTreeMap::new();
        fields.insert("from".to_string(), self.from.into());
        fields.insert("to".to_string(), self.to.into());
        fields.insert("countback".to_string(), self.countback.into());
        ParamValue::Object(fields)
    }
}

/// Parameters for one options-chain request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsChainParams {
    /// Underlying ticker symbol
    pub underlying: String,
    /// Limit the chain to one expiration date
    pub expiration: Option<NaiveDate>,
    /// Days to expiry (alternative to `expiration`)
    pub dte: Option<u32>,
    /// Limit the chain to one strike
    pub strike: Option<f64>,
    /// Number of strikes on each side of the money
    pub strike_limit: Option<u32>,
    /// Moneyness filter
    pub range: Option<StrikeRange>,
    /// Calls only or puts only
    pub side: Option<OptionSide>,
    /// Drop contracts below this open interest
    pub min_open_interest: Option<u32>,
    /// Drop contracts below this volume
    pub min_volume: Option<u32>,
    pub basic_params: Option<BasicParams>,
    pub from_to_params: Option<FromToParams>,
    /// Desired output shape
    pub output: Output,
}

impl OptionsChainParams {
    /// Creates chain parameters for an underlying with no filters
    pub fn new(underlying: impl Into<String>) -> Self {
        Self {
            underlying: underlying.into(),
            ..Self::default()
        }
    }

    /// Flattens filters and nested objects into query pairs.
    ///
    /// The underlying is not included: it travels in the URL path.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_if(&mut pairs, "expiration", self.expiration.as_ref().map(date_str));
        push_if(&mut pairs, "dte", self.dte.map(|v| v.to_string()));
        push_if(&mut pairs, "strike", self.strike.map(|v| v.to_string()));
        push_if(&mut pairs, "strikeLimit", self.strike_limit.map(|v| v.to_string()));
        push_if(&mut pairs, "range", self.range.map(|v| v.as_str().to_string()));
        push_if(&mut pairs, "side", self.side.map(|v| v.as_str().to_string()));
        push_if(
            &mut pairs,
            "minOpenInterest",
            self.min_open_interest.map(|v| v.to_string()),
        );
        push_if(&mut pairs, "minVolume", self.min_volume.map(|v| v.to_string()));
        if let Some(basic) = &self.basic_params {
            pairs.extend(basic.query_pairs());
        }
        if let Some(from_to) = &self.from_to_params {
            pairs.extend(from_to.query_pairs());
        }
        pairs
    }

    /// Builds the cache signature: the operation name plus every effective
    /// parameter, nested objects included
    pub fn signature(&self, method_name: &str) -> RequestSignature {
        RequestSignature::new()
            .with("method_name", method_name)
            .with("underlying", self.underlying.as_str())
            .with("expiration", self.expiration)
            .with("dte", self.dte)
            .with("strike", self.strike)
            .with("strike_limit", self.strike_limit)
            .with("range", self.range.map(|v| v.as_str()))
            .with("side", self.side.map(|v| v.as_str()))
            .with("min_open_interest", self.min_open_interest)
            .with("min_volume", self.min_volume)
            .with(
                "basic_params",
                self.basic_params.as_ref().map(BasicParams::signature_value),
            )
            .with(
                "from_to_params",
                self.from_to_params.as_ref().map(FromToParams::signature_value),
            )
            .with("output", self.output.as_str())
    }
}

/// Parameters for one options-quotes request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsQuoteParams {
    /// OCC option symbol (e.g. `AAPL250117C00150000`)
    pub option_symbol: String,
    pub basic_params: Option<BasicParams>,
    pub from_to_params: Option<FromToParams>,
    /// Restrict the response to these columns
    pub columns: Option<String>,
    /// Desired output shape
    pub output: Output,
}

impl OptionsQuoteParams {
    /// Creates quote parameters for one option symbol
    pub fn new(option_symbol: impl Into<String>) -> Self {
        Self {
            option_symbol: option_symbol.into(),
            ..Self::default()
        }
    }

    /// Flattens nested objects into query pairs; the symbol travels in the
    /// URL path
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(basic) = &self.basic_params {
            pairs.extend(basic.query_pairs());
        }
        if let Some(from_to) = &self.from_to_params {
            pairs.extend(from_to.query_pairs());
        }
        push_if(&mut pairs, "columns", self.columns.clone());
        pairs
    }

    /// Builds the cache signature for this request
    pub fn signature(&self, method_name: &str) -> RequestSignature {
        RequestSignature::new()
            .with("method_name", method_name)
            .with("option_symbol", self.option_symbol.as_str())
            .with(
                "basic_params",
                self.basic_params.as_ref().map(BasicParams::signature_value),
            )
            .with(
                "from_to_params",
                self.from_to_params.as_ref().map(FromToParams::signature_value),
            )
            .with("columns", self.columns.clone())
            .with("output", self.output.as_str())
    }
}

/// Optional settings for single-symbol candle requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockCandlesOptions {
    /// Restrict the response to these columns
    pub columns: Option<String>,
    /// Exchange acronym, MIC code, or Yahoo exchange code
    pub exchange: Option<String>,
    /// Include extended-hours sessions for intraday resolutions
    pub extended_hours: bool,
    /// ISO 3166 country code of the exchange; `US` when unset
    pub exchange_country: Option<String>,
    pub adjust_splits: Option<bool>,
    pub adjust_dividends: Option<bool>,
}

impl StockCandlesOptions {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_if(&mut pairs, "columns", self.columns.clone());
        push_if(&mut pairs, "exchange", self.exchange.clone());
        pairs.push(("extended_hours".to_string(), self.extended_hours.to_string()));
        pairs.push((
            "exchange_country".to_string(),
            self.exchange_country.clone().unwrap_or_else(|| "US".to_string()),
        ));
        push_if(&mut pairs, "adjust_splits", self.adjust_splits.map(|v| v.to_string()));
        push_if(
            &mut pairs,
            "adjust_dividends",
            self.adjust_dividends.map(|v| v.to_string()),
        );
        pairs
    }
}

/// Optional settings for bulk candle requests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkCandlesOptions {
    pub exchange: Option<String>,
    /// ISO 3166 country code; `US` when unset
    pub country: Option<String>,
    /// Return the latest candle for every symbol instead of a range
    pub snapshot: bool,
    pub adjust_splits: Option<bool>,
    pub adjust_dividends: Option<bool>,
    pub columns: Option<String>,
}

impl BulkCandlesOptions {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        push_if(&mut pairs, "exchange", self.exchange.clone());
        push_if(&mut pairs, "adjust_splits", self.adjust_splits.map(|v| v.to_string()));
        push_if(
            &mut pairs,
            "adjust_dividends",
            self.adjust_dividends.map(|v| v.to_string()),
        );
        push_if(&mut pairs, "columns", self.columns.clone());
        pairs.push((
            "country".to_string(),
            self.country.clone().unwrap_or_else(|| "US".to_string()),
        ));
        pairs.push(("snapshot".to_string(), self.snapshot.to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_params_query_pairs_skip_unset_fields() {
        let params = BasicParams {
            lookup_date: NaiveDate::from_ymd_opt(2024, 1, 5),
            limit: Some(50),
            ..BasicParams::default()
        };

        let pairs = params.query_pairs();
        assert_eq!(
            pairs,
            vec![
                ("date".to_string(), "2024-01-05".to_string()),
                ("limit".to_string(), "50".to_string()),
            ]
        );
    }

    #[test]
    fn test_from_to_params_range() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
        let pairs = FromToParams::range(from, to).query_pairs();

        assert_eq!(
            pairs,
            vec![
                ("from".to_string(), "2024-01-02".to_string()),
                ("to".to_string(), "2024-02-02".to_string()),
            ]
        );
    }

    #[test]
    fn test_chain_query_pairs_exclude_underlying_and_flatten_nested() {
        let params = OptionsChainParams {
            side: Some(OptionSide::Call),
            range: Some(StrikeRange::Itm),
            from_to_params: Some(FromToParams {
                countback: Some(10),
                ..FromToParams::default()
            }),
            ..OptionsChainParams::new("SPY")
        };

        let pairs = params.query_pairs();
        assert!(pairs.iter().all(|(name, _)| name != "underlying"));
        assert!(pairs.contains(&("side".to_string(), "call".to_string())));
        assert!(pairs.contains(&("range".to_string(), "itm".to_string())));
        assert!(pairs.contains(&("countback".to_string(), "10".to_string())));
    }

    #[test]
    fn test_chain_signature_is_stable_across_equal_params() {
        let build = || OptionsChainParams {
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15),
            strike: Some(450.0),
            basic_params: Some(BasicParams {
                limit: Some(5),
                ..BasicParams::default()
            }),
            ..OptionsChainParams::new("SPY")
        };

        let a = build().signature("options_chain").fingerprint();
        let b = build().signature("options_chain").fingerprint();
        assert_eq!(a, b);
    }

    #[test]
    fn test_chain_signature_distinguishes_method_names() {
        let params = OptionsChainParams::new("SPY");
        assert_ne!(
            params.signature("options_chain").fingerprint(),
            params.signature("options_quotes").fingerprint()
        );
    }

    #[test]
    fn test_quote_signature_includes_unset_fields_as_null() {
        // Two constructions of the same logical request must agree even
        // though one never touched the optional fields.
        let explicit = OptionsQuoteParams {
            option_symbol: "AAPL250117C00150000".to_string(),
            basic_params: None,
            from_to_params: None,
            columns: None,
            output: Output::Table,
        };
        let terse = OptionsQuoteParams::new("AAPL250117C00150000");

        assert_eq!(
            explicit.signature("options_quotes").fingerprint(),
            terse.signature("options_quotes").fingerprint()
        );
    }

    #[test]
    fn test_stock_candles_options_defaults() {
        let pairs = StockCandlesOptions::default().query_pairs();

        assert!(pairs.contains(&("extended_hours".to_string(), "false".to_string())));
        assert!(pairs.contains(&("exchange_country".to_string(), "US".to_string())));
        assert!(pairs.iter().all(|(name, _)| name != "columns"));
    }

    #[test]
    fn test_bulk_candles_options_defaults() {
        let pairs = BulkCandlesOptions::default().query_pairs();

        assert!(pairs.contains(&("country".to_string(), "US".to_string())));
        assert!(pairs.contains(&("snapshot".to_string(), "false".to_string())));
    }
}
