use crate::storage::KeyValueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub fn delay_from_env() -> Duration {
    let ms = std::env::var("TAMIO_PERSIST_DEBOUNCE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_DEBOUNCE_MS);
    Duration::from_millis(ms)
}

#[derive(Debug)]
enum WriteCommand {
    Put(String),
    Flush(oneshot::Sender<()>),
}

/// Coalesces bursts of writes to one storage key. Every `schedule` cancels the
/// pending timer and starts a new one; only the last value is written. The
/// pending value is also written on `flush` and when every handle is dropped.
#[derive(Debug, Clone)]
pub struct DebouncedWriter {
    key: Arc<str>,
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl DebouncedWriter {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, key: impl Into<String>, delay: Duration) -> Self {
        let key: Arc<str> = Arc::from(key.into());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(store, Arc::clone(&key), delay, rx));
        Self { key, tx }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn schedule(&self, value: String) {
        if self.tx.send(WriteCommand::Put(value)).is_err() {
            tracing::warn!(key = %self.key, "debounced writer stopped; change kept in memory only");
        }
    }

    /// Writes any pending value now and waits for it to land.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run(
    store: Arc<dyn KeyValueStore>,
    key: Arc<str>,
    delay: Duration,
    mut rx: mpsc::UnboundedReceiver<WriteCommand>,
) {
    let mut pending: Option<String> = None;
    let mut degraded = false;

    loop {
        let cmd = if pending.is_some() {
            match tokio::time::timeout(delay, rx.recv()).await {
                Ok(cmd) => cmd,
                Err(_elapsed) => {
                    write(&*store, &key, pending.take(), &mut degraded).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match cmd {
            Some(WriteCommand::Put(value)) => pending = Some(value),
            Some(WriteCommand::Flush(ack)) => {
                write(&*store, &key, pending.take(), &mut degraded).await;
                let _ = ack.send(());
            }
            None => {
                write(&*store, &key, pending.take(), &mut degraded).await;
                break;
            }
        }
    }
}

async fn write(store: &dyn KeyValueStore, key: &str, value: Option<String>, degraded: &mut bool) {
    let Some(value) = value else {
        return;
    };
    if *degraded {
        tracing::debug!(%key, "client storage degraded; skipping write");
        return;
    }
    if let Err(err) = store.set(key, &value).await {
        *degraded = true;
        tracing::warn!(
            %key,
            error = %err,
            "client storage write failed; continuing in memory for this session"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{BrokenKvStore, CountingKvStore};

    const DELAY: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_single_trailing_write() {
        let store = Arc::new(CountingKvStore::default());
        let writer = DebouncedWriter::spawn(store.clone(), "k", DELAY);

        for i in 0..10 {
            writer.schedule(format!("v{i}"));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(store.writes(), 0);

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(store.writes(), 1);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v9"));
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_without_waiting_for_timer() {
        let store = Arc::new(CountingKvStore::default());
        let writer = DebouncedWriter::spawn(store.clone(), "k", DELAY);
        writer.schedule("v1".to_string());
        writer.flush().await;
        assert_eq!(store.writes(), 1);

        // Nothing pending, so a second flush does not write again.
        writer.flush().await;
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_writer_persists_pending_value() {
        let store = Arc::new(CountingKvStore::default());
        let writer = DebouncedWriter::spawn(store.clone(), "k", DELAY);
        writer.schedule("last".to_string());
        drop(writer);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("last"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_writes_are_not_fatal() {
        let writer = DebouncedWriter::spawn(Arc::new(BrokenKvStore), "k", DELAY);
        writer.schedule("v1".to_string());
        writer.flush().await;
        writer.schedule("v2".to_string());
        writer.flush().await;
        assert_eq!(writer.key(), "k");
    }
}
