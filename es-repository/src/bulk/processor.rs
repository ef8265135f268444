//! Background worker that batches bulk actions.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, instrument, warn};

use crate::bulk::{BulkAction, BulkItemFailure, BulkListener, BulkRequest, BulkResponse};
use crate::config::{BackoffConfig, BulkConfig};
use crate::errors::RepositoryError;
use crate::interfaces::BulkTransport;

/// Number of queued commands before `add` waits for the worker.
const CHANNEL_CAPACITY: usize = 1000;

enum Command {
    Add(BulkAction),
    Flush(oneshot::Sender<()>),
}

/// Buffers write actions and sends them as bulk requests.
///
/// A batch is sent when it reaches `bulk_actions` actions or
/// `bulk_size_bytes` bytes, when the flush timer fires, or on `flush`.
/// At most `concurrent_requests` batches are in flight at once; further
/// batches wait for a free slot, which in turn makes `add` wait.
///
/// Dropping the processor without calling `close` stops intake and lets
/// the worker send what is pending in the background.
pub struct BulkProcessor {
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
}

impl BulkProcessor {
    /// Start the worker. Must be called within a tokio runtime.
    ///
    /// Fails when `config` is outside the limits of `BulkConfig::validate`.
    pub fn spawn(
        transport: Arc<dyn BulkTransport>,
        config: BulkConfig,
        listener: Arc<dyn BulkListener>,
    ) -> Result<Self, RepositoryError> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        info!(
            bulk_actions = config.bulk_actions,
            bulk_size_bytes = config.bulk_size_bytes,
            flush_interval = ?config.flush_interval,
            concurrent_requests = config.concurrent_requests,
            "Starting bulk processor"
        );

        let worker = Worker {
            semaphore: (config.concurrent_requests > 0)
                .then(|| Arc::new(Semaphore::new(config.concurrent_requests))),
            transport,
            config,
            listener,
            pending: BulkRequest::new(),
            execution_id: 0,
        };

        Ok(Self {
            tx,
            worker: tokio::spawn(worker.run(rx)),
        })
    }

    /// Queue an action.
    pub async fn add(&self, action: BulkAction) -> Result<(), RepositoryError> {
        self.tx
            .send(Command::Add(action))
            .await
            .map_err(|_| RepositoryError::BulkClosed)
    }

    /// Send the pending batch now. Returns once the batch is dispatched,
    /// not when the cluster has answered.
    pub async fn flush(&self) -> Result<(), RepositoryError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| RepositoryError::BulkClosed)?;
        ack_rx.await.map_err(|_| RepositoryError::BulkClosed)
    }

    /// Stop intake, send the pending batch and wait for every batch in flight.
    #[instrument(skip(self))]
    pub async fn close(self) -> Result<(), RepositoryError> {
        drop(self.tx);
        self.worker
            .await
            .map_err(|e| RepositoryError::transport(format!("bulk worker failed: {}", e)))?;
        info!("Bulk processor closed");
        Ok(())
    }
}

struct Worker {
    transport: Arc<dyn BulkTransport>,
    config: BulkConfig,
    listener: Arc<dyn BulkListener>,
    semaphore: Option<Arc<Semaphore>>,
    pending: BulkRequest,
    execution_id: u64,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut ticker = self.config.flush_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Add(action)) => {
                        self.pending.push(action);
                        if self.is_full() {
                            self.dispatch().await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        self.dispatch().await;
                        let _ = ack.send(());
                    }
                    None => break,
                },
                _ = tick(&mut ticker) => {
                    self.dispatch().await;
                }
            }
        }

        self.dispatch().await;

        // Every permit back means every batch has completed.
        if let Some(ref semaphore) = self.semaphore {
            match u32::try_from(self.config.concurrent_requests) {
                Ok(permits) => {
                    let _ = semaphore.acquire_many(permits).await;
                }
                Err(e) => error!(error = %e, "Cannot wait for in-flight batches"),
            }
        }
        debug!(executions = self.execution_id, "Bulk worker stopped");
    }

    fn is_full(&self) -> bool {
        (self.config.bulk_actions > 0 && self.pending.len() >= self.config.bulk_actions)
            || (self.config.bulk_size_bytes > 0
                && self.pending.size_bytes() >= self.config.bulk_size_bytes)
    }

    async fn dispatch(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let request = std::mem::take(&mut self.pending);
        self.execution_id += 1;
        let execution_id = self.execution_id;

        let transport = self.transport.clone();
        let listener = self.listener.clone();
        let backoff = self.config.backoff.clone();

        match self.semaphore {
            Some(ref semaphore) => {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(execution_id, error = %e, "Bulk semaphore closed, dropping batch");
                        return;
                    }
                };
                tokio::spawn(async move {
                    execute(transport, listener, backoff, execution_id, request).await;
                    drop(permit);
                });
            }
            None => execute(transport, listener, backoff, execution_id, request).await,
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Delays between attempts: `initial_delay`, doubled after each retry.
fn backoff_delays(backoff: &BackoffConfig) -> impl Iterator<Item = Duration> {
    let initial = backoff.initial_delay;
    (0..backoff.max_retries).map(move |n| initial.saturating_mul(1u32 << n.min(31)))
}

async fn execute(
    transport: Arc<dyn BulkTransport>,
    listener: Arc<dyn BulkListener>,
    backoff: BackoffConfig,
    execution_id: u64,
    request: BulkRequest,
) {
    listener.before_bulk(execution_id, &request);
    let result = send_with_backoff(transport.as_ref(), &backoff, execution_id, &request).await;
    listener.after_bulk(execution_id, &request, result.as_ref());
}

/// Send `request`, retrying what the cluster rejected for overload.
///
/// A rejected request is resent whole; items rejected inside a successful
/// response are resent on their own. Both draw from the same delays, so
/// `max_retries` bounds the retries of the whole batch. Failures in the
/// returned response refer to positions in `request`.
async fn send_with_backoff(
    transport: &dyn BulkTransport,
    backoff: &BackoffConfig,
    execution_id: u64,
    request: &BulkRequest,
) -> Result<BulkResponse, RepositoryError> {
    let mut delays = backoff_delays(backoff);
    let mut pending = request.clone();
    let mut origin: Vec<usize> = (0..request.len()).collect();
    let mut took = 0;
    let mut failures = Vec::new();

    loop {
        let response = {
            let pending = &pending;
            RetryIf::spawn(
                delays.by_ref(),
                move || transport.send_bulk(pending),
                |e: &RepositoryError| {
                    if e.is_retryable() {
                        debug!(execution_id, error = %e, "Retrying rejected bulk request");
                    }
                    e.is_retryable()
                },
            )
            .await?
        };
        took += response.took;

        let (rejected, failed): (Vec<_>, Vec<_>) = response
            .failures
            .into_iter()
            .partition(BulkItemFailure::is_rejected);
        failures.extend(failed.into_iter().map(|f| remap(f, &origin)));

        if rejected.is_empty() {
            break;
        }
        let Some(delay) = delays.next() else {
            warn!(execution_id, rejected = rejected.len(), "Giving up on rejected bulk items");
            failures.extend(rejected.into_iter().map(|f| remap(f, &origin)));
            break;
        };

        debug!(execution_id, rejected = rejected.len(), ?delay, "Retrying rejected bulk items");
        sleep(delay).await;

        let mut retry = BulkRequest::new();
        let mut retry_origin = Vec::with_capacity(rejected.len());
        for failure in rejected {
            match pending.actions().get(failure.position) {
                Some(action) => {
                    retry.push(action.clone());
                    retry_origin.push(origin[failure.position]);
                }
                None => failures.push(remap(failure, &origin)),
            }
        }
        if retry.is_empty() {
            break;
        }
        pending = retry;
        origin = retry_origin;
    }

    failures.sort_by_key(|f| f.position);
    Ok(BulkResponse {
        took,
        items: request.len(),
        failures,
    })
}

fn remap(mut failure: BulkItemFailure, origin: &[usize]) -> BulkItemFailure {
    if let Some(&position) = origin.get(failure.position) {
        failure.position = position;
    }
    failure
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::NoopListener;
    use crate::config::MAX_CONCURRENT_REQUESTS;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock transport recording the size of every batch it receives.
    ///
    /// `rejections` fails whole requests with `Rejected`; `item_rejections`
    /// answers with the first item of the batch refused with status 429.
    struct MockTransport {
        batches: Mutex<Vec<usize>>,
        attempts: AtomicUsize,
        rejections: AtomicUsize,
        item_rejections: AtomicUsize,
        sent_tx: mpsc::UnboundedSender<usize>,
    }

    impl MockTransport {
        fn new(rejections: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<usize>) {
            Self::with_item_rejections(rejections, 0)
        }

        fn with_item_rejections(
            rejections: usize,
            item_rejections: usize,
        ) -> (Arc<Self>, mpsc::UnboundedReceiver<usize>) {
            let (sent_tx, sent_rx) = mpsc::unbounded_channel();
            let transport = Arc::new(Self {
                batches: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                rejections: AtomicUsize::new(rejections),
                item_rejections: AtomicUsize::new(item_rejections),
                sent_tx,
            });
            (transport, sent_rx)
        }

        fn batches(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl BulkTransport for MockTransport {
        async fn send_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, RepositoryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if take_one(&self.rejections) {
                return Err(RepositoryError::Rejected("es_rejected_execution_exception".into()));
            }

            self.batches.lock().unwrap().push(request.len());
            let _ = self.sent_tx.send(request.len());

            let reject_first = take_one(&self.item_rejections);
            let items: Vec<Value> = (0..request.len())
                .map(|n| {
                    if n == 0 && reject_first {
                        json!({"index": {"_index": "logs", "status": 429, "error": {
                            "type": "es_rejected_execution_exception",
                            "reason": "queue full"
                        }}})
                    } else {
                        json!({"index": {"_index": "logs", "status": 201}})
                    }
                })
                .collect();
            let body = json!({ "took": 1, "errors": reject_first, "items": items });
            Ok(BulkResponse::from_value(body).unwrap())
        }
    }

    /// Listener recording whether each batch succeeded and its failed items.
    #[derive(Default)]
    struct RecordingListener {
        before: AtomicUsize,
        results: Mutex<Vec<bool>>,
        failures: Mutex<Vec<BulkItemFailure>>,
    }

    impl BulkListener for RecordingListener {
        fn before_bulk(&self, _execution_id: u64, _request: &BulkRequest) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }

        fn after_bulk(
            &self,
            _execution_id: u64,
            _request: &BulkRequest,
            result: Result<&BulkResponse, &RepositoryError>,
        ) {
            self.results.lock().unwrap().push(result.is_ok());
            if let Ok(response) = result {
                self.failures
                    .lock()
                    .unwrap()
                    .extend(response.failures.iter().cloned());
            }
        }
    }

    fn action(n: usize) -> BulkAction {
        BulkAction::index("logs", Some(n.to_string()), json!({ "n": n }))
    }

    fn config(bulk_actions: usize) -> BulkConfig {
        BulkConfig {
            bulk_actions,
            bulk_size_bytes: 0,
            flush_interval: None,
            concurrent_requests: 1,
            backoff: BackoffConfig::default(),
        }
    }

    #[test]
    fn test_backoff_delays() {
        let delays: Vec<Duration> = backoff_delays(&BackoffConfig::default()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[tokio::test]
    async fn test_flushes_on_action_count() {
        let (transport, _rx) = MockTransport::new(0);
        let processor =
            BulkProcessor::spawn(transport.clone(), config(2), Arc::new(NoopListener)).unwrap();

        for n in 0..5 {
            processor.add(action(n)).await.unwrap();
        }
        processor.close().await.unwrap();

        let mut batches = transport.batches();
        batches.sort_unstable();
        assert_eq!(batches, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_flushes_on_byte_size() {
        let (transport, _rx) = MockTransport::new(0);
        let mut config = config(0);
        config.bulk_size_bytes = action(1).estimated_size() * 2;
        config.concurrent_requests = 0;

        let processor =
            BulkProcessor::spawn(transport.clone(), config, Arc::new(NoopListener)).unwrap();
        for n in 1..4 {
            processor.add(action(n)).await.unwrap();
        }
        processor.close().await.unwrap();

        assert_eq!(transport.batches(), vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_interval() {
        let (transport, mut rx) = MockTransport::new(0);
        let mut config = config(100);
        config.flush_interval = Some(Duration::from_secs(10));

        let started = Instant::now();
        let processor =
            BulkProcessor::spawn(transport.clone(), config, Arc::new(NoopListener)).unwrap();
        processor.add(action(1)).await.unwrap();

        assert_eq!(rx.recv().await, Some(1));
        assert!(started.elapsed() >= Duration::from_secs(10));

        processor.close().await.unwrap();
        assert_eq!(transport.batches(), vec![1]);
    }

    #[tokio::test]
    async fn test_explicit_flush() {
        let (transport, mut rx) = MockTransport::new(0);
        let processor =
            BulkProcessor::spawn(transport.clone(), config(100), Arc::new(NoopListener)).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.add(action(2)).await.unwrap();
        processor.flush().await.unwrap();

        assert_eq!(rx.recv().await, Some(2));
        processor.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_sends_pending() {
        let (transport, _rx) = MockTransport::new(0);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(100), listener.clone()).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.close().await.unwrap();

        assert_eq!(transport.batches(), vec![1]);
        assert_eq!(listener.before.load(Ordering::SeqCst), 1);
        assert_eq!(*listener.results.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rejected_batch() {
        let (transport, _rx) = MockTransport::new(2);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(1), listener.clone()).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.close().await.unwrap();

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(transport.batches(), vec![1]);
        assert_eq!(*listener.results.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let (transport, _rx) = MockTransport::new(usize::MAX);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(1), listener.clone()).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.close().await.unwrap();

        // First attempt plus three retries.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
        assert!(transport.batches().is_empty());
        assert_eq!(*listener.results.lock().unwrap(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_rejected_items() {
        let (transport, _rx) = MockTransport::with_item_rejections(0, 1);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(2), listener.clone()).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.add(action(2)).await.unwrap();
        processor.close().await.unwrap();

        // The refused item is resent on its own.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(transport.batches(), vec![2, 1]);
        assert_eq!(*listener.results.lock().unwrap(), vec![true]);
        assert!(listener.failures.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_items_still_rejected_after_retries() {
        let (transport, _rx) = MockTransport::with_item_rejections(0, usize::MAX);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(2), listener.clone()).unwrap();

        let started = Instant::now();
        processor.add(action(1)).await.unwrap();
        processor.add(action(2)).await.unwrap();
        processor.close().await.unwrap();

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(transport.batches(), vec![2, 1, 1, 1]);
        assert!(started.elapsed() >= Duration::from_millis(700));

        let failures = listener.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].position, 0);
        assert!(failures[0].is_rejected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_and_item_retries_share_the_budget() {
        let (transport, _rx) = MockTransport::with_item_rejections(2, usize::MAX);
        let listener = Arc::new(RecordingListener::default());
        let processor =
            BulkProcessor::spawn(transport.clone(), config(1), listener.clone()).unwrap();

        processor.add(action(1)).await.unwrap();
        processor.close().await.unwrap();

        // Two whole-request retries, then one item retry.
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(listener.failures.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_rejects_out_of_range_config() {
        let (transport, _rx) = MockTransport::new(0);
        let mut config = config(1);
        config.concurrent_requests = 4_294_967_297;

        let result = BulkProcessor::spawn(transport, config, Arc::new(NoopListener));
        assert!(matches!(result, Err(RepositoryError::ConfigError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_waits_for_every_batch_in_flight() {
        let (transport, _rx) = MockTransport::new(0);
        let mut config = config(1);
        config.concurrent_requests = MAX_CONCURRENT_REQUESTS;

        let processor =
            BulkProcessor::spawn(transport.clone(), config, Arc::new(NoopListener)).unwrap();
        for n in 0..3 {
            processor.add(action(n)).await.unwrap();
        }
        processor.close().await.unwrap();

        assert_eq!(transport.batches(), vec![1, 1, 1]);
    }
}
