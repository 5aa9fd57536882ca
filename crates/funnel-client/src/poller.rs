//! Order Status Poller
//!
//! Watches one order until it reaches a stop status, the attempt budget is
//! spent, or the caller stops it. Runs as a cancellable tokio task; progress
//! is published through a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use funnel_core::{OrderId, OrderStatus, OrderStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::ApiClient;
use crate::error::Result;

/// Error recorded when the attempt budget runs out
pub const TIMED_OUT: &str = "polling timed out";

/// Time source for the polling interval
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Tokio timer clock (honours paused time in tests)
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Where the poller reads order status from
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Current status, or `None` when the order does not exist
    async fn fetch_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>>;
}

/// Reads status straight from an order store
pub struct StoreStatusSource<S: ?Sized> {
    store: Arc<S>,
}

impl<S: OrderStore + ?Sized> StoreStatusSource<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: OrderStore + ?Sized> StatusSource for StoreStatusSource<S> {
    async fn fetch_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>> {
        Ok(self.store.get(order_id).await?.map(|order| order.status))
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, order_id: &OrderId) -> Result<Option<OrderStatus>> {
        Ok(self.fetch_order(order_id).await?.map(|summary| summary.status))
    }
}

/// Poller configuration
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Delay between fetches
    pub poll_interval: Duration,

    /// Fetches allowed before giving up
    pub max_attempts: u32,

    /// Stop by itself once a status in `stop_on` is observed
    pub auto_stop: bool,

    pub stop_on: Vec<OrderStatus>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 120,
            auto_stop: true,
            stop_on: vec![OrderStatus::Approved],
        }
    }
}

/// Observable poller state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollSnapshot {
    /// Last observed status
    pub status: Option<OrderStatus>,

    /// Last fetch error, cleared by the next successful fetch
    pub error: Option<String>,

    /// Fetches made so far
    pub attempts: u32,

    pub polling: bool,
}

/// Why the polling task ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// A stop status was observed
    Terminal(OrderStatus),

    /// `max_attempts` fetches without reaching a stop status
    TimedOut,

    /// Stopped by the caller
    Stopped,
}

/// Order status poller
pub struct StatusPoller {
    source: Arc<dyn StatusSource>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn StatusSource>, config: PollerConfig) -> Self {
        Self {
            source,
            clock: Arc::new(TokioClock),
            config,
        }
    }

    /// Replace the interval clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start polling `order_id`.
    ///
    /// The first fetch happens immediately. `on_status_change` runs every time
    /// the observed status differs from the previous one, including the first
    /// observation.
    pub fn start<F>(&self, order_id: OrderId, on_status_change: F) -> PollHandle
    where
        F: FnMut(OrderStatus) + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(PollSnapshot {
            polling: true,
            ..PollSnapshot::default()
        });

        let task = tokio::spawn(run(
            order_id,
            Arc::clone(&self.source),
            Arc::clone(&self.clock),
            self.config.clone(),
            stop_rx,
            snapshot_tx,
            on_status_change,
        ));

        tracing::debug!(order_id = %order_id, "Status polling started");

        PollHandle {
            stop_tx,
            snapshot: snapshot_rx,
            task: Some(task),
        }
    }
}

async fn run<F>(
    order_id: OrderId,
    source: Arc<dyn StatusSource>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    mut stop_rx: watch::Receiver<bool>,
    snapshot: watch::Sender<PollSnapshot>,
    mut on_status_change: F,
) -> PollOutcome
where
    F: FnMut(OrderStatus) + Send + 'static,
{
    let finish = |outcome: PollOutcome, error: Option<&str>| {
        snapshot.send_modify(|s| {
            s.polling = false;
            if let Some(error) = error {
                s.error = Some(error.to_string());
            }
        });
        outcome
    };

    let mut last_status: Option<OrderStatus> = None;
    let mut attempts: u32 = 0;

    loop {
        if *stop_rx.borrow() {
            return finish(PollOutcome::Stopped, None);
        }
        if attempts >= config.max_attempts {
            tracing::warn!(order_id = %order_id, attempts, "Status polling timed out");
            return finish(PollOutcome::TimedOut, Some(TIMED_OUT));
        }

        attempts += 1;
        let fetched = source.fetch_status(&order_id).await;

        // A stop issued during the fetch wins over its result
        if *stop_rx.borrow() {
            return finish(PollOutcome::Stopped, None);
        }

        match fetched {
            Ok(Some(status)) => {
                snapshot.send_modify(|s| {
                    s.status = Some(status);
                    s.error = None;
                    s.attempts = attempts;
                });

                if last_status != Some(status) {
                    tracing::info!(
                        order_id = %order_id,
                        status = %status,
                        attempts,
                        "Order status changed"
                    );
                    last_status = Some(status);
                    on_status_change(status);
                }

                if config.auto_stop && config.stop_on.contains(&status) {
                    return finish(PollOutcome::Terminal(status), None);
                }
            }
            Ok(None) => {
                tracing::debug!(order_id = %order_id, attempts, "Order not found yet");
                snapshot.send_modify(|s| {
                    s.error = Some("order not found".into());
                    s.attempts = attempts;
                });
            }
            Err(e) => {
                tracing::warn!(order_id = %order_id, attempts, error = %e, "Status fetch failed");
                snapshot.send_modify(|s| {
                    s.error = Some(e.to_string());
                    s.attempts = attempts;
                });
            }
        }

        tokio::select! {
            () = clock.sleep(config.poll_interval) => {}
            _ = stop_rx.changed() => return finish(PollOutcome::Stopped, None),
        }
    }
}

/// Handle to a running poller; dropping it cancels the task
pub struct PollHandle {
    stop_tx: watch::Sender<bool>,
    snapshot: watch::Receiver<PollSnapshot>,
    task: Option<JoinHandle<PollOutcome>>,
}

impl PollHandle {
    /// Stop polling; calling it again has no effect
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_polling(&self) -> bool {
        !*self.stop_tx.borrow() && self.snapshot.borrow().polling
    }

    /// Latest snapshot
    pub fn snapshot(&self) -> PollSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every snapshot change
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.snapshot.clone()
    }

    /// Wait for the polling task to end
    pub async fn join(mut self) -> PollOutcome {
        let Some(task) = self.task.take() else {
            return PollOutcome::Stopped;
        };
        task.await.unwrap_or(PollOutcome::Stopped)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use funnel_core::{MemoryOrderStore, NewOrder};
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum Step {
        Status(OrderStatus),
        Missing,
        Fail,
    }

    /// Replays a script; the last step repeats forever
    struct ScriptedSource {
        script: Vec<Step>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _: &OrderId) -> Result<Option<OrderStatus>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script[n.min(self.script.len() - 1)] {
                Step::Status(status) => Ok(Some(status)),
                Step::Missing => Ok(None),
                Step::Fail => Err(ClientError::Api {
                    status: 503,
                    message: "unavailable".into(),
                }),
            }
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<OrderStatus>>>, impl FnMut(OrderStatus) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |status| sink.lock().unwrap().push(status))
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_approval() {
        let source = ScriptedSource::new(vec![
            Step::Status(OrderStatus::Pending),
            Step::Status(OrderStatus::Pending),
            Step::Status(OrderStatus::Approved),
        ]);
        let poller = StatusPoller::new(source.clone(), PollerConfig::default());
        let (seen, on_change) = recorder();

        let handle = poller.start(OrderId::new(), on_change);
        let snapshots = handle.subscribe();

        assert_eq!(handle.join().await, PollOutcome::Terminal(OrderStatus::Approved));
        assert_eq!(*seen.lock().unwrap(), vec![OrderStatus::Pending, OrderStatus::Approved]);
        assert_eq!(source.calls(), 3);

        let last = snapshots.borrow().clone();
        assert_eq!(last.status, Some(OrderStatus::Approved));
        assert_eq!(last.attempts, 3);
        assert!(!last.polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_max_attempts() {
        let source = ScriptedSource::new(vec![Step::Status(OrderStatus::Pending)]);
        let config = PollerConfig {
            max_attempts: 3,
            ..PollerConfig::default()
        };
        let (seen, on_change) = recorder();

        let handle = StatusPoller::new(source.clone(), config).start(OrderId::new(), on_change);
        let snapshots = handle.subscribe();

        assert_eq!(handle.join().await, PollOutcome::TimedOut);
        assert_eq!(source.calls(), 3);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(snapshots.borrow().error.as_deref(), Some(TIMED_OUT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_errors_keep_polling() {
        let source = ScriptedSource::new(vec![
            Step::Fail,
            Step::Missing,
            Step::Status(OrderStatus::Approved),
        ]);
        let (seen, on_change) = recorder();

        let poller = StatusPoller::new(source.clone(), PollerConfig::default());
        let handle = poller.start(OrderId::new(), on_change);
        let snapshots = handle.subscribe();

        assert_eq!(handle.join().await, PollOutcome::Terminal(OrderStatus::Approved));
        assert_eq!(source.calls(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![OrderStatus::Approved]);
        assert!(snapshots.borrow().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_status_does_not_stop_by_default() {
        let source = ScriptedSource::new(vec![Step::Status(OrderStatus::Failed)]);
        let config = PollerConfig {
            max_attempts: 4,
            ..PollerConfig::default()
        };
        let (seen, on_change) = recorder();

        let handle = StatusPoller::new(source.clone(), config).start(OrderId::new(), on_change);

        assert_eq!(handle.join().await, PollOutcome::TimedOut);
        assert_eq!(*seen.lock().unwrap(), vec![OrderStatus::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let source = ScriptedSource::new(vec![Step::Status(OrderStatus::Pending)]);
        let (_, on_change) = recorder();

        let poller = StatusPoller::new(source.clone(), PollerConfig::default());
        let handle = poller.start(OrderId::new(), on_change);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_polling());
        assert_eq!(source.calls(), 1);

        handle.stop();
        handle.stop();
        assert!(!handle.is_polling());
        assert_eq!(handle.join().await, PollOutcome::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_polling() {
        let source = ScriptedSource::new(vec![Step::Status(OrderStatus::Pending)]);
        let (_, on_change) = recorder();

        let poller = StatusPoller::new(source.clone(), PollerConfig::default());
        let handle = poller.start(OrderId::new(), on_change);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(source.calls(), 2);

        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), 2);
    }

    /// Returns at once and records every requested interval
    #[derive(Default)]
    struct RecordingClock {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_injected_clock_drives_interval() {
        let source = ScriptedSource::new(vec![
            Step::Status(OrderStatus::Pending),
            Step::Status(OrderStatus::Pending),
            Step::Status(OrderStatus::Approved),
        ]);
        let clock = Arc::new(RecordingClock::default());
        let config = PollerConfig {
            poll_interval: Duration::from_secs(2),
            ..PollerConfig::default()
        };
        let (_, on_change) = recorder();

        let handle = StatusPoller::new(source, config)
            .with_clock(clock.clone())
            .start(OrderId::new(), on_change);

        assert_eq!(handle.join().await, PollOutcome::Terminal(OrderStatus::Approved));
        assert_eq!(*clock.sleeps.lock().unwrap(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_backed_source() {
        let store = Arc::new(MemoryOrderStore::new());
        let order = store.insert(NewOrder::pending(dec!(187.00), None)).await.unwrap();
        let source = StoreStatusSource::new(Arc::clone(&store));

        assert_eq!(source.fetch_status(&order.id).await.unwrap(), Some(OrderStatus::Pending));
        assert_eq!(source.fetch_status(&OrderId::new()).await.unwrap(), None);

        let poller = StatusPoller::new(Arc::new(source), PollerConfig::default());
        let (seen, on_change) = recorder();
        let handle = poller.start(order.id, on_change);

        tokio::time::sleep(Duration::from_secs(7)).await;
        store
            .update(
                &funnel_core::OrderFilter::by_id(order.id),
                &funnel_core::OrderPatch::status(OrderStatus::Approved),
            )
            .await
            .unwrap();

        assert_eq!(handle.join().await, PollOutcome::Terminal(OrderStatus::Approved));
        assert_eq!(*seen.lock().unwrap(), vec![OrderStatus::Pending, OrderStatus::Approved]);
    }
}
