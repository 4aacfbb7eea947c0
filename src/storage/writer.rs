use super::rows::TableRow;
use super::store::ColumnStore;
use super::StorageError;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Token-bucket limiter gating writer flushes. Shared by every writer of
/// one import so the store sees a bounded request rate overall.
pub type FlushLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

pub fn flush_limiter(flushes_per_second: u32) -> Arc<FlushLimiter> {
    let rate = NonZeroU32::new(flushes_per_second.max(1)).expect("clamped to at least 1");
    Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(rate)))
}

const WRITER_CHANNEL_CAPACITY: usize = 1000;

/// Channel-fed batch writer for one table.
///
/// `workers` tasks share the input channel, accumulate thread-local
/// batches, and flush on the size threshold or on shutdown. Flush
/// issuance waits on the rate limiter; delivery is at-least-once with
/// dedup handled by the store's `INSERT OR IGNORE` keys. Workers exit
/// only once the channel is closed and drained, so cancellation upstream
/// still lets accepted rows reach the store.
pub struct TableWriter<E: TableRow> {
    tx: mpsc::Sender<E>,
    handles: Vec<JoinHandle<Result<u64, StorageError>>>,
}

impl<E: TableRow> TableWriter<E> {
    pub fn spawn(
        store: ColumnStore,
        db: &str,
        table: &'static str,
        workers: usize,
        batch_size: usize,
        limiter: Arc<FlushLimiter>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<E>(WRITER_CHANNEL_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers.max(1) {
            let store = store.clone();
            let db = db.to_string();
            let rx = rx.clone();
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let mut batch: Vec<E> = Vec::with_capacity(batch_size);
                let mut written: u64 = 0;
                loop {
                    let next = { rx.lock().await.recv().await };
                    match next {
                        Some(entry) => {
                            batch.push(entry);
                            if batch.len() >= batch_size {
                                written +=
                                    flush(&store, &db, table, &limiter, &mut batch).await?;
                            }
                        }
                        None => {
                            written += flush(&store, &db, table, &limiter, &mut batch).await?;
                            debug!(table, worker, written, "writer worker drained");
                            return Ok(written);
                        }
                    }
                }
            }));
        }

        Self { tx, handles }
    }

    /// Sender feeding this writer. Drop every clone to begin shutdown.
    pub fn sender(&self) -> mpsc::Sender<E> {
        self.tx.clone()
    }

    /// Close the input and wait for all workers to drain. Returns the
    /// total rows written.
    pub async fn finish(self) -> Result<u64, StorageError> {
        drop(self.tx);
        let mut total = 0;
        for handle in self.handles {
            total += handle.await??;
        }
        Ok(total)
    }
}

async fn flush<E: TableRow>(
    store: &ColumnStore,
    db: &str,
    table: &'static str,
    limiter: &FlushLimiter,
    batch: &mut Vec<E>,
) -> Result<u64, StorageError> {
    if batch.is_empty() {
        return Ok(0);
    }
    limiter.until_ready().await;
    let rows = std::mem::take(batch);
    let count = rows.len() as u64;
    match store.insert_batch(db, table, rows).await {
        Ok(_) => Ok(count),
        Err(e) => {
            error!(table, error = %e, "batch flush failed");
            Err(e)
        }
    }
}
