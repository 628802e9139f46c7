//! FIFO rate limiter for the scoring endpoint
//!
//! One queue, one dispatch worker: tasks are executed strictly in submission
//! order and only one task runs at a time. Before each dispatch the worker
//! waits for the larger of
//! - the remainder of the current 60s window, when the window's request
//!   budget is spent
//! - the remainder of the minimum interval since the previous dispatch
//!
//! Queue residency is only checked when a task reaches the head of the queue.
//! Window and interval bookkeeping is owned by the worker task and never shared.

use crate::error::AnalysisError;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter settings
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u32,
    pub min_interval: Duration,
    pub queue_timeout: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 20,
            min_interval: Duration::from_millis(1000),
            queue_timeout: Duration::from_secs(300),
        }
    }
}

impl RateLimiterConfig {
    pub fn from_settings(settings: &iprep_common::config::AnalysisSettings) -> Self {
        Self {
            requests_per_minute: settings.requests_per_minute.max(1),
            min_interval: Duration::from_millis(settings.min_interval_ms),
            queue_timeout: Duration::from_secs(settings.queue_timeout_secs),
        }
    }
}

/// Snapshot of limiter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub dispatched: u64,
    pub expired: u64,
    pub queued: usize,
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    expired: AtomicU64,
    queued: AtomicUsize,
}

/// Runs the task, or hands it a rejection instead
type Job = Box<dyn FnOnce(Option<AnalysisError>) -> BoxFuture<'static, ()> + Send>;

struct QueuedTask {
    enqueued_at: Instant,
    job: Job,
}

/// FIFO rate limiter with a single dispatch worker
///
/// Must be constructed inside a tokio runtime (the worker is spawned on
/// creation). The worker exits once every handle is dropped and the queue
/// has drained.
#[derive(Clone)]
pub struct RateLimiter {
    sender: mpsc::UnboundedSender<QueuedTask>,
    counters: Arc<Counters>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());

        tracing::debug!(
            requests_per_minute = config.requests_per_minute,
            min_interval_ms = config.min_interval.as_millis() as u64,
            queue_timeout_secs = config.queue_timeout.as_secs(),
            "Starting rate limiter worker"
        );
        tokio::spawn(run_worker(receiver, config, counters.clone()));

        Self { sender, counters }
    }

    /// Queue `task` and wait for its own outcome
    ///
    /// # Errors
    /// - `QueueTimeout` if the task sat in the queue past the residency limit
    /// - `LimiterClosed` if the worker is gone
    /// - whatever the task itself returns
    pub async fn submit<F, Fut, T>(&self, task: F) -> Result<T, AnalysisError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, AnalysisError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |rejection| {
            Box::pin(async move {
                let outcome = match rejection {
                    Some(err) => Err(err),
                    None => task().await,
                };
                // Caller may have given up waiting
                let _ = tx.send(outcome);
            })
        });

        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        if self
            .sender
            .send(QueuedTask {
                enqueued_at: Instant::now(),
                job,
            })
            .is_err()
        {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(AnalysisError::LimiterClosed);
        }

        rx.await.map_err(|_| AnalysisError::LimiterClosed)?
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats {
            dispatched: self.counters.dispatched.load(Ordering::SeqCst),
            expired: self.counters.expired.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<QueuedTask>,
    config: RateLimiterConfig,
    counters: Arc<Counters>,
) {
    let budget = config.requests_per_minute.max(1);
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;
    let mut last_dispatch: Option<Instant> = None;

    while let Some(task) = receiver.recv().await {
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        let waited = task.enqueued_at.elapsed();
        if waited > config.queue_timeout {
            counters.expired.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                waited_ms = waited.as_millis() as u64,
                limit_ms = config.queue_timeout.as_millis() as u64,
                "Rejecting expired queued request"
            );
            (task.job)(Some(AnalysisError::QueueTimeout {
                waited_ms: waited.as_millis() as u64,
                limit_ms: config.queue_timeout.as_millis() as u64,
            }))
            .await;
            continue;
        }

        let now = Instant::now();
        if now.duration_since(window_start) >= WINDOW {
            window_start = now;
            window_count = 0;
        }

        let mut wait = Duration::ZERO;
        if window_count >= budget {
            wait = WINDOW.saturating_sub(now.duration_since(window_start));
        }
        if let Some(last) = last_dispatch {
            let since_last = now.duration_since(last);
            if since_last < config.min_interval {
                wait = wait.max(config.min_interval - since_last);
            }
        }

        if !wait.is_zero() {
            tracing::debug!("Rate limiting: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }

        let now = Instant::now();
        if now.duration_since(window_start) >= WINDOW {
            window_start = now;
            window_count = 0;
        }
        window_count += 1;
        last_dispatch = Some(now);
        counters.dispatched.fetch_add(1, Ordering::SeqCst);

        (task.job)(None).await;
    }

    tracing::debug!("Rate limiter queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::Mutex;

    fn config(rpm: u32, min_interval_ms: u64, queue_timeout_ms: u64) -> RateLimiterConfig {
        RateLimiterConfig {
            requests_per_minute: rpm,
            min_interval: Duration::from_millis(min_interval_ms),
            queue_timeout: Duration::from_millis(queue_timeout_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_21st_task_waits_for_window_reset() {
        let limiter = RateLimiter::new(config(20, 0, 600_000));
        let start = Instant::now();

        let futures = (0..25).map(|_| limiter.submit(|| async { Ok(Instant::now()) }));
        let results = join_all(futures).await;

        assert_eq!(results.len(), 25);
        let times: Vec<Instant> = results.into_iter().map(|r| r.unwrap()).collect();

        for t in &times[..20] {
            assert!(t.duration_since(start) < Duration::from_secs(60));
        }
        for t in &times[20..] {
            assert!(t.duration_since(start) >= Duration::from_secs(60));
        }
        assert_eq!(limiter.stats().dispatched, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_spacing() {
        let limiter = RateLimiter::new(config(100, 500, 600_000));
        let start = Instant::now();

        let futures = (0..3).map(|_| limiter.submit(|| async { Ok(Instant::now()) }));
        let times: Vec<Instant> = join_all(futures)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(times[1].duration_since(start) >= Duration::from_millis(500));
        assert!(times[2].duration_since(start) >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_is_fifo() {
        let limiter = RateLimiter::new(config(100, 10, 600_000));
        let order = Arc::new(Mutex::new(Vec::new()));

        let futures = (0..10).map(|i| {
            let order = order.clone();
            limiter.submit(move || async move {
                order.lock().unwrap().push(i);
                Ok(())
            })
        });
        join_all(futures).await;

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_failure_does_not_block_queue() {
        let limiter = RateLimiter::new(config(100, 0, 600_000));

        let failing = limiter.submit(|| async {
            Err::<u32, _>(AnalysisError::TransientCall {
                status: Some(500),
                message: "boom".to_string(),
            })
        });
        let succeeding = limiter.submit(|| async { Ok(7u32) });
        let (first, second) = tokio::join!(failing, succeeding);

        assert!(matches!(first, Err(AnalysisError::TransientCall { .. })));
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_task_rejected_at_head_of_queue() {
        let limiter = RateLimiter::new(config(100, 0, 1_000));

        let slow = limiter.submit(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(1u32)
        });
        let starved = limiter.submit(|| async { Ok(2u32) });
        let (first, second) = tokio::join!(slow, starved);

        assert_eq!(first.unwrap(), 1);
        assert!(matches!(second, Err(AnalysisError::QueueTimeout { .. })));
        assert_eq!(limiter.stats().expired, 1);
    }
}
