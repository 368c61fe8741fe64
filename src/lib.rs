//! Client and response cache for the marketdata.app market-data API
//!
//! Requests are fingerprinted into deterministic cache keys, responses are
//! normalized into typed columnar tables, and results persist on disk so
//! repeated calls never spend paid API quota twice. See [`MarketDataClient`]
//! for per-endpoint calls and [`MarketDataManager`] for concurrent batches.

pub mod cache;
pub mod client;
pub mod manager;
pub mod params;
pub mod response;
pub mod table;

pub use cache::{
    CacheError, CacheStore, ParamValue, RequestSignature, STATUS_CACHE_HIT, STATUS_ERROR,
    STATUS_NO_DATA,
};
pub use client::{ClientError, MarketDataClient, BASE_URL};
pub use manager::{ManagerError, MarketDataManager};
pub use params::{
    BasicParams, BulkCandlesOptions, FromToParams, OptionSide, OptionsChainParams,
    OptionsQuoteParams, StockCandlesOptions, StrikeRange,
};
pub use response::{normalize, Output, Payload};
pub use table::{Column, Table, TableError};
