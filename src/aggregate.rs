use eyre::Result;
use log::{debug, info, warn};
use std::collections::HashMap;

use crate::pool::ScanOutcome;
use crate::sink::RecordSink;

/// Native asset of the chain; seeded so the table always carries its key.
pub const NATIVE_ASSET: &str = "NEO";

/// Running per-asset record of observed positive amounts.
#[derive(Debug)]
pub struct TotalsTable {
    entries: HashMap<String, Vec<f64>>,
}

impl TotalsTable {
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(NATIVE_ASSET.to_string(), Vec::new());
        Self { entries }
    }

    /// Insert the symbol if absent, then append the amount.
    pub fn record(&mut self, symbol: &str, amount: f64) {
        self.entries.entry(symbol.to_string()).or_default().push(amount);
    }

    /// Per-symbol sums, positive ones only, sorted by symbol.
    pub fn positive_sums(&self) -> Vec<(String, f64)> {
        let mut sums: Vec<(String, f64)> = self
            .entries
            .iter()
            .map(|(symbol, amounts)| (symbol.clone(), amounts.iter().sum()))
            .filter(|(_, sum)| *sum > 0.0)
            .collect();
        sums.sort_by(|a, b| a.0.cmp(&b.0));
        sums
    }
}

impl Default for TotalsTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Final tallies of one run.
#[derive(Debug)]
pub struct ScanReport {
    pub totals: TotalsTable,
    pub processed: usize,
    pub failed: usize,
}

/// Consumes the completion stream and accumulates per-asset totals.
///
/// Runs entirely on the consuming task; the table and the sink have a single
/// writer, so completions are processed strictly one at a time.
pub struct Aggregator {
    totals: TotalsTable,
    sink: Option<RecordSink>,
    processed: usize,
    failed: usize,
}

impl Aggregator {
    pub fn new(sink: Option<RecordSink>) -> Self {
        Self {
            totals: TotalsTable::new(),
            sink,
            processed: 0,
            failed: 0,
        }
    }

    /// Handle one completed lookup.
    ///
    /// Permanent per-address failures are logged and counted; only a fatal
    /// fetch error propagates and aborts the run.
    pub fn ingest(&mut self, outcome: ScanOutcome) -> Result<()> {
        self.processed += 1;

        match outcome.result {
            Ok(record) => {
                debug!("got a result for {}", record.address);
                if let Some(sink) = &mut self.sink {
                    sink.append(&record)?;
                }

                for asset in &record.balance {
                    if asset.amount > 0.0 {
                        info!(
                            "found {} {} in {}",
                            asset.amount, asset.asset_symbol, record.address
                        );
                        self.totals.record(&asset.asset_symbol, asset.amount);
                    }
                }
            }
            Err(err) if err.is_fatal() => {
                return Err(eyre::eyre!("fatal error checking {}: {}", outcome.address, err));
            }
            Err(err) => {
                warn!("giving up on {}: {}", outcome.address, err);
                self.failed += 1;
            }
        }

        Ok(())
    }

    /// Flush the sink and emit the per-asset summary.
    pub fn finish(mut self) -> Result<ScanReport> {
        if let Some(sink) = &mut self.sink {
            sink.flush()?;
        }

        for (symbol, sum) in self.totals.positive_sums() {
            info!("found a total of {} {} in all checked wallets", sum, symbol);
        }
        debug!("full totals table: {:?}", self.totals);

        Ok(ScanReport {
            totals: self.totals,
            processed: self.processed,
            failed: self.failed,
        })
    }
}
