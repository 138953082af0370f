//! Bounded-parallel executor for CPU-bound transform jobs.
//!
//! Dedicated OS threads drain a FIFO queue; async callers submit over a
//! oneshot reply channel. An optional `max_queue_bytes` bound suspends
//! submitters (FIFO over waiters) until bytes drain. A panic crossing
//! the transformer boundary re-queues the job at the head once; the
//! second failure surfaces as an `{error}` result. Jobs that *return*
//! an error are never retried.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use ionify_config::TransformOptions;

use crate::error::PoolError;
use crate::transformer::{JobOutput, TransformJob, Transformer};

/// Result of one job as seen by callers: transform failures are values.
pub type JobResult = Result<JobOutput, String>;

struct QueuedJob {
    job: TransformJob,
    reply: oneshot::Sender<JobResult>,
    retried: bool,
}

struct PoolState {
    queue: VecDeque<QueuedJob>,
    queued_bytes: usize,
    closed: bool,
    space_waiters: VecDeque<Arc<Notify>>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    job_ready: Condvar,
    max_queue_bytes: Option<usize>,
    transformer: Arc<dyn Transformer>,
    opts: TransformOptions,
}

/// The worker pool.
pub struct WorkerPool {
    inner: Arc<PoolInner>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl WorkerPool {
    /// Default worker count: `max(1, cpu_count - 1)`.
    pub fn default_size() -> usize {
        num_cpus::get().saturating_sub(1).max(1)
    }

    pub fn new(
        transformer: Arc<dyn Transformer>,
        opts: TransformOptions,
        size: usize,
        max_queue_bytes: Option<usize>,
    ) -> Self {
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                queued_bytes: 0,
                closed: false,
                space_waiters: VecDeque::new(),
            }),
            job_ready: Condvar::new(),
            max_queue_bytes,
            transformer,
            opts,
        });

        let size = size.max(1);
        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let worker_inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("ionify-worker-{}", index))
                .spawn(move || worker_loop(worker_inner))
                .expect("worker thread spawn");
            workers.push(handle);
        }

        Self {
            inner,
            workers: Mutex::new(workers),
        }
    }

    /// Run one job to completion.
    ///
    /// Suspends under queue-bytes backpressure. Fails with
    /// [`PoolError::Closed`] if the pool closes before or while the job
    /// is queued.
    pub async fn run(&self, job: TransformJob) -> Result<JobResult, PoolError> {
        let rx = self.enqueue(job).await?;
        rx.await.map_err(|_| PoolError::Closed)
    }

    /// Run a batch; results come back in input order.
    pub async fn run_many(&self, jobs: Vec<TransformJob>) -> Result<Vec<JobResult>, PoolError> {
        let mut receivers = Vec::with_capacity(jobs.len());
        for job in jobs {
            receivers.push(self.enqueue(job).await?);
        }
        let mut results = Vec::with_capacity(receivers.len());
        for rx in receivers {
            results.push(rx.await.map_err(|_| PoolError::Closed)?);
        }
        Ok(results)
    }

    /// Terminate all workers, release all waiters, discard the queue.
    /// Subsequent submissions fail with [`PoolError::Closed`].
    /// Idempotent.
    pub fn close(&self) {
        let (discarded, waiters) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                (Vec::new(), Vec::new())
            } else {
                state.closed = true;
                state.queued_bytes = 0;
                (
                    state.queue.drain(..).collect::<Vec<_>>(),
                    state.space_waiters.drain(..).collect::<Vec<_>>(),
                )
            }
        };

        self.inner.job_ready.notify_all();
        for waiter in waiters {
            waiter.notify_one();
        }
        // Dropping the queued jobs drops their reply senders, failing
        // the corresponding receivers with Closed.
        drop(discarded);

        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }

    async fn enqueue(&self, job: TransformJob) -> Result<oneshot::Receiver<JobResult>, PoolError> {
        let bytes = job.queue_bytes();
        let mut job = Some(job);

        loop {
            let waiter = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }

                let fits = match self.inner.max_queue_bytes {
                    // An empty queue always accepts, so oversized
                    // single jobs cannot wedge the pool.
                    Some(max) => state.queue.is_empty() || state.queued_bytes + bytes <= max,
                    None => true,
                };

                if fits {
                    let (tx, rx) = oneshot::channel();
                    state.queued_bytes += bytes;
                    state.queue.push_back(QueuedJob {
                        job: job.take().expect("job present until enqueued"),
                        reply: tx,
                        retried: false,
                    });
                    self.inner.job_ready.notify_one();
                    return Ok(rx);
                }

                let notify = Arc::new(Notify::new());
                state.space_waiters.push_back(Arc::clone(&notify));
                notify
            };

            waiter.notified().await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(inner: Arc<PoolInner>) {
    loop {
        let queued = {
            let mut state = inner.state.lock();
            loop {
                if let Some(queued) = state.queue.pop_front() {
                    state.queued_bytes = state.queued_bytes.saturating_sub(queued.job.queue_bytes());
                    if let Some(waiter) = state.space_waiters.pop_front() {
                        waiter.notify_one();
                    }
                    break Some(queued);
                }
                if state.closed {
                    break None;
                }
                inner.job_ready.wait(&mut state);
            }
        };

        let Some(mut queued) = queued else {
            return;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            inner.transformer.transform(&queued.job, &inner.opts)
        }));

        match outcome {
            Ok(result) => {
                let _ = queued.reply.send(result);
            }
            Err(_) if !queued.retried => {
                // Abnormal exit: retry exactly once, at the queue head.
                warn!(job = %queued.job.path.display(), "transform worker crashed, retrying");
                queued.retried = true;
                let mut state = inner.state.lock();
                if state.closed {
                    continue;
                }
                state.queued_bytes += queued.job.queue_bytes();
                state.queue.push_front(queued);
                inner.job_ready.notify_one();
            }
            Err(_) => {
                debug!(job = %queued.job.path.display(), "transform crashed twice, surfacing error");
                let message = format!(
                    "transform of {} crashed after retry",
                    queued.job.path.display()
                );
                let _ = queued.reply.send(Err(message));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::transformer::PassthroughTransformer;

    fn job(id: &str, code: &str) -> TransformJob {
        TransformJob {
            id: id.to_string(),
            path: PathBuf::from(format!("/src/{}.ts", id)),
            ext: "ts".into(),
            code: code.to_string(),
            module_hash: None,
        }
    }

    fn passthrough_pool(size: usize, max_queue_bytes: Option<usize>) -> WorkerPool {
        WorkerPool::new(
            Arc::new(PassthroughTransformer),
            TransformOptions::default(),
            size,
            max_queue_bytes,
        )
    }

    #[tokio::test]
    async fn test_run_round_trips_code() {
        let pool = passthrough_pool(2, None);
        let result = pool.run(job("a", "let a = 1")).await.unwrap().unwrap();
        assert_eq!(result.code, "let a = 1");
        pool.close();
    }

    #[tokio::test]
    async fn test_run_many_preserves_order() {
        let pool = passthrough_pool(4, None);
        let jobs: Vec<_> = (0..16).map(|i| job(&i.to_string(), &format!("code {}", i))).collect();

        let results = pool.run_many(jobs).await.unwrap();
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().code, format!("code {}", i));
        }
        pool.close();
    }

    #[tokio::test]
    async fn test_close_fails_subsequent_submissions() {
        let pool = passthrough_pool(1, None);
        pool.close();
        let err = pool.run(job("a", "x")).await.unwrap_err();
        assert_eq!(err, PoolError::Closed);

        // close is idempotent
        pool.close();
    }

    /// Slow transformer used to hold the queue busy.
    struct SlowTransformer {
        delay: Duration,
    }

    impl Transformer for SlowTransformer {
        fn transform(
            &self,
            job: &TransformJob,
            _opts: &TransformOptions,
        ) -> Result<JobOutput, String> {
            std::thread::sleep(self.delay);
            Ok(JobOutput {
                code: job.code.clone(),
                map: None,
                output_type: "js".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_queue_bytes_backpressure_blocks_until_drain() {
        let pool = Arc::new(WorkerPool::new(
            Arc::new(SlowTransformer {
                delay: Duration::from_millis(50),
            }),
            TransformOptions::default(),
            1,
            Some(8),
        ));

        // First job occupies the queue (and then the worker); the
        // second exceeds max_queue_bytes while the first is queued.
        let first = pool.run(job("first", "12345678"));
        let second = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.run(job("second", "12345678")).await })
        };

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.code, "12345678");

        // The blocked submitter completes once bytes drained.
        let second = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("backpressure released")
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.code, "12345678");
        pool.close();
    }

    /// Panics on the first call for each job id, succeeds after.
    struct FlakyTransformer {
        attempts: AtomicUsize,
    }

    impl Transformer for FlakyTransformer {
        fn transform(
            &self,
            job: &TransformJob,
            _opts: &TransformOptions,
        ) -> Result<JobOutput, String> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("simulated crash");
            }
            Ok(JobOutput {
                code: job.code.clone(),
                map: None,
                output_type: "js".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_crash_retries_once_then_succeeds() {
        let pool = WorkerPool::new(
            Arc::new(FlakyTransformer {
                attempts: AtomicUsize::new(0),
            }),
            TransformOptions::default(),
            1,
            None,
        );

        let result = pool.run(job("flaky", "code")).await.unwrap().unwrap();
        assert_eq!(result.code, "code");
        pool.close();
    }

    struct AlwaysPanics;

    impl Transformer for AlwaysPanics {
        fn transform(
            &self,
            _job: &TransformJob,
            _opts: &TransformOptions,
        ) -> Result<JobOutput, String> {
            panic!("unrecoverable");
        }
    }

    #[tokio::test]
    async fn test_second_crash_surfaces_error_result() {
        let pool = WorkerPool::new(
            Arc::new(AlwaysPanics),
            TransformOptions::default(),
            1,
            None,
        );

        let result = pool.run(job("doomed", "code")).await.unwrap();
        let err = result.unwrap_err();
        assert!(err.contains("crashed after retry"));
        pool.close();
    }

    struct ErrorTransformer {
        calls: AtomicUsize,
    }

    impl Transformer for ErrorTransformer {
        fn transform(
            &self,
            _job: &TransformJob,
            _opts: &TransformOptions,
        ) -> Result<JobOutput, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err("parse error".into())
        }
    }

    #[tokio::test]
    async fn test_error_results_never_retry() {
        let transformer = Arc::new(ErrorTransformer {
            calls: AtomicUsize::new(0),
        });
        let pool = WorkerPool::new(
            Arc::clone(&transformer) as Arc<dyn Transformer>,
            TransformOptions::default(),
            1,
            None,
        );

        let result = pool.run(job("bad", "code")).await.unwrap();
        assert_eq!(result.unwrap_err(), "parse error");
        assert_eq!(transformer.calls.load(Ordering::SeqCst), 1);
        pool.close();
    }

    #[test]
    fn test_default_size_at_least_one() {
        assert!(WorkerPool::default_size() >= 1);
    }
}
