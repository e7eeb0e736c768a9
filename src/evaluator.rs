//! # Position Evaluators
//!
//! An [`Evaluator`] turns leaf positions into a value and move priors, for
//! example a neural network inference service. The search only consumes the
//! contract; batching and latency are the evaluator's business.
//!
//! [`BatchEvaluator`] is the dedicated batching worker: search threads submit
//! single positions and block on a per-request slot, while one background
//! thread collects requests into batches and forwards them to the inner
//! evaluator.
//!
//! ```text
//!   worker 0 ──┐                         ┌──► slot 0 (Condvar)
//!   worker 1 ──┼──► queue (Mutex+Condvar) ──► batch thread ──► inner.evaluate_batch
//!   worker 2 ──┘                         └──► slot 2 (Condvar)
//! ```
//!
//! A waiter gives up after the configured timeout and reports
//! [`EvalError::Timeout`], which the search turns into a failed playout.

use crate::error::EvalError;
use crate::node::Move;
use crate::value::StatisticsExt;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Value and move priors of one position.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Value in `[0, 1]` for the player to move.
    pub value: f64,
    /// Prior probability per legal move. Moves missing here get prior 0.
    pub priors: Vec<(Move, f64)>,
}

impl Evaluation {
    pub fn prior_of(&self, mv: Move) -> f64 {
        self.priors
            .iter()
            .find(|(m, _)| *m == mv)
            .map_or(0.0, |(_, p)| *p)
    }
}

/// Evaluates batches of positions.
pub trait Evaluator<G>: Send + Sync {
    /// Returns one result per position, in order.
    fn evaluate_batch(&self, positions: &[G]) -> Vec<Result<Evaluation, EvalError>>;

    fn evaluate(&self, position: &G) -> Result<Evaluation, EvalError> {
        self.evaluate_batch(std::slice::from_ref(position))
            .pop()
            .unwrap_or_else(|| Err(EvalError::Failed("evaluator returned no result".into())))
    }
}

/// Batching parameters of a [`BatchEvaluator`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Largest batch forwarded to the inner evaluator.
    pub batch_size: usize,
    /// How long the batch thread waits for a batch to fill up.
    pub max_latency: Duration,
    /// How long a submitter waits for its result.
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_latency: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Result slot a submitter blocks on.
struct Slot {
    result: Mutex<Option<Result<Evaluation, EvalError>>>,
    ready: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self {
            result: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn fill(&self, result: Result<Evaluation, EvalError>) {
        *self.result.lock() = Some(result);
        self.ready.notify_one();
    }

    fn wait(&self, timeout: Duration) -> Result<Evaluation, EvalError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.result.lock();
        loop {
            if let Some(result) = guard.take() {
                return result;
            }
            if self.ready.wait_until(&mut guard, deadline).timed_out() {
                return guard.take().unwrap_or(Err(EvalError::Timeout));
            }
        }
    }
}

struct Request<G> {
    position: G,
    slot: Arc<Slot>,
}

struct Queue<G> {
    pending: Vec<Request<G>>,
    shutdown: bool,
}

struct Shared<G> {
    queue: Mutex<Queue<G>>,
    available: Condvar,
    batch_sizes: Mutex<StatisticsExt>,
}

/// Collects single-position requests from many threads into batches.
pub struct BatchEvaluator<G: Send + 'static> {
    shared: Arc<Shared<G>>,
    config: BatchConfig,
    handle: Option<JoinHandle<()>>,
}

impl<G: Send + 'static> BatchEvaluator<G> {
    /// Starts the batch thread in front of `inner`.
    pub fn new(inner: Arc<dyn Evaluator<G>>, config: BatchConfig) -> Result<Self, EvalError> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                pending: Vec::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
            batch_sizes: Mutex::new(StatisticsExt::new()),
        });
        let thread_shared = Arc::clone(&shared);
        let batch_size = config.batch_size.max(1);
        let max_latency = config.max_latency;
        let handle = std::thread::Builder::new()
            .name("batch-evaluator".into())
            .spawn(move || run_batches(&thread_shared, inner.as_ref(), batch_size, max_latency))
            .map_err(|e| EvalError::Failed(format!("cannot start batch thread: {e}")))?;
        debug!(
            "batch evaluator started (batch_size={}, max_latency={:?})",
            batch_size, max_latency
        );
        Ok(Self {
            shared,
            config,
            handle: Some(handle),
        })
    }

    /// Distribution of the batch sizes forwarded so far.
    pub fn batch_stats(&self) -> StatisticsExt {
        *self.shared.batch_sizes.lock()
    }

    fn submit(&self, position: G) -> Result<Arc<Slot>, EvalError> {
        let slot = Arc::new(Slot::new());
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return Err(EvalError::Disconnected);
        }
        queue.pending.push(Request {
            position,
            slot: Arc::clone(&slot),
        });
        drop(queue);
        self.shared.available.notify_one();
        Ok(slot)
    }
}

fn run_batches<G>(
    shared: &Shared<G>,
    inner: &dyn Evaluator<G>,
    batch_size: usize,
    max_latency: Duration,
) {
    loop {
        let batch = {
            let mut queue = shared.queue.lock();
            while queue.pending.is_empty() && !queue.shutdown {
                shared.available.wait(&mut queue);
            }
            if queue.pending.is_empty() {
                break;
            }
            let deadline = Instant::now() + max_latency;
            while queue.pending.len() < batch_size && !queue.shutdown {
                if shared.available.wait_until(&mut queue, deadline).timed_out() {
                    break;
                }
            }
            let take = queue.pending.len().min(batch_size);
            queue.pending.drain(..take).collect::<Vec<_>>()
        };
        shared.batch_sizes.lock().add(batch.len() as f64);
        let (positions, slots): (Vec<G>, Vec<Arc<Slot>>) = batch
            .into_iter()
            .map(|request| (request.position, request.slot))
            .unzip();
        let mut results = inner.evaluate_batch(&positions).into_iter();
        for slot in slots {
            let result = results
                .next()
                .unwrap_or_else(|| Err(EvalError::Failed("batch result missing".into())));
            slot.fill(result);
        }
    }
    debug!("batch evaluator stopped");
}

impl<G: Clone + Send + 'static> Evaluator<G> for BatchEvaluator<G> {
    fn evaluate_batch(&self, positions: &[G]) -> Vec<Result<Evaluation, EvalError>> {
        let slots: Vec<Result<Arc<Slot>, EvalError>> =
            positions.iter().map(|p| self.submit(p.clone())).collect();
        slots
            .into_iter()
            .map(|slot| {
                let result = slot?.wait(self.config.timeout);
                if matches!(result, Err(EvalError::Timeout)) {
                    warn!("evaluation timed out after {:?}", self.config.timeout);
                }
                result
            })
            .collect()
    }
}

impl<G: Send + 'static> Drop for BatchEvaluator<G> {
    fn drop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.available.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores a position (an integer) as `x / 100` and gives every
    /// move below 3 an equal prior.
    struct Scaled {
        calls: AtomicUsize,
    }

    impl Evaluator<u32> for Scaled {
        fn evaluate_batch(&self, positions: &[u32]) -> Vec<Result<Evaluation, EvalError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            positions
                .iter()
                .map(|&x| {
                    if x == 99 {
                        Err(EvalError::Failed("bad position".into()))
                    } else {
                        Ok(Evaluation {
                            value: x as f64 / 100.0,
                            priors: (0..3).map(|m| (Move(m), 1.0 / 3.0)).collect(),
                        })
                    }
                })
                .collect()
        }
    }

    #[test]
    fn test_single_evaluation() {
        let inner = Arc::new(Scaled {
            calls: AtomicUsize::new(0),
        });
        let batcher = BatchEvaluator::new(inner, BatchConfig::default()).unwrap();
        let eval = batcher.evaluate(&42).unwrap();
        assert!((eval.value - 0.42).abs() < 1e-12);
        assert!((eval.prior_of(Move(1)) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(eval.prior_of(Move(7)), 0.0);
    }

    #[test]
    fn test_errors_stay_per_position() {
        let inner = Arc::new(Scaled {
            calls: AtomicUsize::new(0),
        });
        let batcher = BatchEvaluator::new(inner, BatchConfig::default()).unwrap();
        let results = batcher.evaluate_batch(&[10, 99, 20]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(EvalError::Failed("bad position".into()))
        );
        assert!((results[2].as_ref().unwrap().value - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_requests_are_batched() {
        let inner = Arc::new(Scaled {
            calls: AtomicUsize::new(0),
        });
        let config = BatchConfig {
            batch_size: 8,
            max_latency: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
        };
        let batcher = Arc::new(BatchEvaluator::new(inner.clone(), config).unwrap());
        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                let batcher = Arc::clone(&batcher);
                std::thread::spawn(move || batcher.evaluate(&i).map(|e| e.value))
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            let value = handle.join().unwrap().unwrap();
            assert!((value - i as f64 / 100.0).abs() < 1e-12);
        }
        let stats = batcher.batch_stats();
        assert!((stats.mean() * stats.count() as f64 - 8.0).abs() < 1e-9);
        assert!(inner.calls.load(Ordering::SeqCst) <= 8);
    }

    struct Stalled;

    impl Evaluator<u32> for Stalled {
        fn evaluate_batch(&self, positions: &[u32]) -> Vec<Result<Evaluation, EvalError>> {
            std::thread::sleep(Duration::from_millis(200));
            positions
                .iter()
                .map(|_| Err(EvalError::Failed("late".into())))
                .collect()
        }
    }

    #[test]
    fn test_waiter_times_out() {
        let config = BatchConfig {
            batch_size: 1,
            max_latency: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let batcher = BatchEvaluator::new(Arc::new(Stalled), config).unwrap();
        assert_eq!(batcher.evaluate(&1), Err(EvalError::Timeout));
    }
}
