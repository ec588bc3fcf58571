pub mod aggregate;
pub mod config;
pub mod fetcher;
pub mod pool;
pub mod sink;
pub mod source;

pub use aggregate::{Aggregator, ScanReport, TotalsTable, NATIVE_ASSET};
pub use config::Args;
pub use fetcher::{
    AssetBalance, BalanceFetcher, BalanceRecord, FetchError, FetcherConfig, RetryPolicy,
    DEFAULT_BASE_URL,
};
pub use pool::{spawn_scan, ScanOutcome};
pub use sink::RecordSink;
pub use source::load_addresses;
