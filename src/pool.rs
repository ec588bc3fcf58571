use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::fetcher::{BalanceFetcher, BalanceRecord, FetchError};

/// One completed lookup, success or failure.
#[derive(Debug)]
pub struct ScanOutcome {
    pub address: String,
    pub result: Result<BalanceRecord, FetchError>,
}

/// Fan the address list out across `workers` concurrent fetch tasks.
///
/// Every address produces exactly one `ScanOutcome` on the returned channel,
/// delivered in completion order. Failures travel the channel as values, so
/// one bad address never cuts the stream short. The channel closes once the
/// whole list has been consumed.
pub fn spawn_scan(
    fetcher: Arc<BalanceFetcher>,
    addresses: Vec<String>,
    workers: usize,
) -> mpsc::Receiver<ScanOutcome> {
    let workers = workers.max(1);
    let (tx, rx) = mpsc::channel(workers);
    let queue = Arc::new(addresses);
    let cursor = Arc::new(AtomicUsize::new(0));

    for _ in 0..workers {
        let tx = tx.clone();
        let queue = Arc::clone(&queue);
        let cursor = Arc::clone(&cursor);
        let fetcher = Arc::clone(&fetcher);

        tokio::spawn(async move {
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(address) = queue.get(index) else {
                    break;
                };

                let result = fetcher.fetch(address).await;
                let outcome = ScanOutcome {
                    address: address.clone(),
                    result,
                };
                if tx.send(outcome).await.is_err() {
                    // Receiver dropped; nothing left to report to.
                    break;
                }
            }
        });
    }

    rx
}
