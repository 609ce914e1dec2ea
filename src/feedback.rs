// Feedback cache and callback dispatch
//
// One writer (the ingestion task) replaces the snapshot wholesale; readers
// borrow the latest one from a watch channel. Callbacks run on a dedicated
// thread behind a bounded queue, so a slow, blocking or failing callback
// never holds up ingestion or the async runtime.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::CALLBACK_QUEUE_DEPTH;
use crate::error::BoxError;

/// Last observed joint positions, replaced on every inbound message
#[derive(Debug, Clone)]
pub struct FeedbackSnapshot {
    /// Monotonic per-message sequence number, starting at 1
    pub seq: u64,
    pub received_at: Instant,
    pub positions: HashMap<String, f64>,
}

impl FeedbackSnapshot {
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn is_stale(&self, window: Duration) -> bool {
        self.age() > window
    }

    pub fn position(&self, joint: &str) -> Option<f64> {
        self.positions.get(joint).copied()
    }
}

/// Single-writer, many-reader snapshot holder
pub struct FeedbackCache {
    latest: watch::Sender<Option<Arc<FeedbackSnapshot>>>,
    seq: AtomicU64,
}

impl Default for FeedbackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackCache {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            seq: AtomicU64::new(0),
        }
    }

    /// Replace the snapshot (no merge with the previous one)
    pub fn store(&self, positions: HashMap<String, f64>) -> Arc<FeedbackSnapshot> {
        let snapshot = Arc::new(FeedbackSnapshot {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            received_at: Instant::now(),
            positions,
        });
        self.latest.send_replace(Some(snapshot.clone()));
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<FeedbackSnapshot>> {
        self.latest.borrow().clone()
    }

    /// Sequence number of the latest snapshot (0 before any feedback)
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<FeedbackSnapshot>>> {
        self.latest.subscribe()
    }
}

/// User callback invoked with joint name -> position on every snapshot
pub type FeedbackCallback =
    Arc<dyn Fn(&HashMap<String, f64>) -> Result<(), BoxError> + Send + Sync>;

/// Append-only callback list with a fire-and-forget dispatcher thread
pub struct FeedbackCallbacks {
    callbacks: Arc<RwLock<Vec<FeedbackCallback>>>,
    tx: mpsc::Sender<Arc<FeedbackSnapshot>>,
    rx: Mutex<Option<mpsc::Receiver<Arc<FeedbackSnapshot>>>>,
    dropped: AtomicU64,
}

impl Default for FeedbackCallbacks {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedbackCallbacks {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(CALLBACK_QUEUE_DEPTH);
        Self {
            callbacks: Arc::new(RwLock::new(Vec::new())),
            tx,
            rx: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn register(&self, callback: FeedbackCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue a snapshot for the dispatcher; never blocks
    ///
    /// When callbacks fall behind by `CALLBACK_QUEUE_DEPTH` snapshots, the
    /// new snapshot is dropped.
    pub fn dispatch(&self, snapshot: Arc<FeedbackSnapshot>) {
        if self.is_empty() {
            return;
        }
        match self.tx.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(snapshot)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(
                        "Feedback callbacks falling behind, dropped snapshot {} ({} so far)",
                        snapshot.seq, dropped
                    );
                }
            }
            Err(TrySendError::Closed(_)) => debug!("Feedback dispatcher gone, dropping snapshot"),
        }
    }

    /// Start the dispatcher thread; returns None if it is already running
    ///
    /// The thread exits once this `FeedbackCallbacks` is dropped.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let mut rx = self
            .rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()?;
        let callbacks = self.callbacks.clone();

        let spawned = thread::Builder::new()
            .name("feedback-callbacks".to_string())
            .spawn(move || {
                while let Some(snapshot) = rx.blocking_recv() {
                    let current: Vec<FeedbackCallback> = callbacks
                        .read()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .clone();
                    for (i, callback) in current.iter().enumerate() {
                        run_callback(i, callback, &snapshot.positions);
                    }
                }
                debug!("Feedback dispatcher stopped");
            });
        match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to start feedback dispatcher: {}", e);
                None
            }
        }
    }
}

// Errors and panics stay inside the dispatcher
fn run_callback(index: usize, callback: &FeedbackCallback, positions: &HashMap<String, f64>) {
    match catch_unwind(AssertUnwindSafe(|| callback(positions))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Feedback callback {} failed: {}", index, e),
        Err(_) => error!("Feedback callback {} panicked", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn positions(value: f64) -> HashMap<String, f64> {
        HashMap::from([("head_yaw".to_string(), value)])
    }

    #[test]
    fn test_snapshot_replaced_wholesale() {
        let cache = FeedbackCache::new();
        assert!(cache.latest().is_none());
        assert_eq!(cache.seq(), 0);

        cache.store(HashMap::from([
            ("head_yaw".to_string(), 0.1),
            ("head_pitch".to_string(), 0.2),
        ]));
        cache.store(positions(0.3));

        let latest = cache.latest().unwrap();
        assert_eq!(latest.seq, 2);
        assert_eq!(latest.position("head_yaw"), Some(0.3));
        assert_eq!(latest.position("head_pitch"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_window() {
        let cache = FeedbackCache::new();
        let snapshot = cache.store(positions(0.0));
        assert!(!snapshot.is_stale(Duration::from_millis(500)));
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(snapshot.is_stale(Duration::from_millis(500)));
    }

    #[test]
    fn test_failing_callbacks_do_not_stop_dispatch() {
        let cache = FeedbackCache::new();
        let callbacks = FeedbackCallbacks::new();
        let seen = Arc::new(AtomicUsize::new(0));

        callbacks.register(Arc::new(|_| Err("boom".into())));
        callbacks.register(Arc::new(|_| panic!("callback bug")));
        let counter = seen.clone();
        callbacks.register(Arc::new(move |p| {
            assert!(p.contains_key("head_yaw"));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let handle = callbacks.start().unwrap();
        assert!(callbacks.start().is_none());

        callbacks.dispatch(cache.store(positions(0.1)));
        callbacks.dispatch(cache.store(positions(0.2)));

        for _ in 0..100 {
            if seen.load(Ordering::SeqCst) == 2 {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        // the dispatcher thread exits with its channel
        drop(callbacks);
        assert!(handle.join().is_ok());
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let cache = FeedbackCache::new();
        let callbacks = FeedbackCallbacks::new();
        callbacks.register(Arc::new(|_| Ok(())));

        // dispatcher not started: nothing drains the queue
        let extra = 10;
        for i in 0..CALLBACK_QUEUE_DEPTH + extra {
            callbacks.dispatch(cache.store(positions(i as f64)));
        }
        assert_eq!(callbacks.dropped(), extra as u64);
        assert_eq!(cache.seq(), (CALLBACK_QUEUE_DEPTH + extra) as u64);
    }

    #[test]
    fn test_blocking_callback_runs_off_the_caller() {
        let cache = FeedbackCache::new();
        let callbacks = FeedbackCallbacks::new();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let done = Arc::new(AtomicUsize::new(0));

        let counter = done.clone();
        callbacks.register(Arc::new(move |_| {
            // parks until the test lets it go
            let _ = release_rx
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .recv();
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        let handle = callbacks.start().unwrap();

        callbacks.dispatch(cache.store(positions(0.1)));
        callbacks.dispatch(cache.store(positions(0.2)));
        assert_eq!(done.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        drop(callbacks);
        assert!(handle.join().is_ok());
        assert_eq!(done.load(Ordering::SeqCst), 2);
    }
}
