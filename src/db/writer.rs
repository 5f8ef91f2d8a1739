//! Single-writer job queue.
//!
//! SQLite allows one writer at a time. Every mutating operation is wrapped in
//! a job and pushed onto a FIFO queue owned by [`WriteSerializer`]; one drain
//! loop runs the jobs back to back. Reads skip the queue and use the pool
//! directly, so they may observe the store before or after a queued write.

use crate::error::StoreError;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error};

/// One unit of write work. Receives a handle to the pool and must finish
/// everything it needs (usually a single transaction) before resolving.
type Job = Box<dyn FnOnce(SqlitePool) -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct QueueState {
    queue: VecDeque<Job>,
    running: bool,
}

struct Inner {
    pool: SqlitePool,
    state: Mutex<QueueState>,
    idle: Notify,
    loop_starts: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // Lock sections only push/pop, so a poisoned guard still holds a
        // consistent queue.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let job = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(job) => job,
                    None => {
                        state.running = false;
                        break;
                    }
                }
            };

            // Call the job inside the future so a panic while building it is
            // caught as well.
            let pool = self.pool.clone();
            let outcome = AssertUnwindSafe(async move { job(pool).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    self.jobs_completed.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(err)) => {
                    self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    let err = StoreError::JobExecution(err);
                    error!(error = %err, "Write job failed");
                }
                Err(panic) => {
                    self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                    let err = StoreError::JobExecution(anyhow::anyhow!(
                        "job panicked: {}",
                        panic_message(&*panic)
                    ));
                    error!(error = %err, "Write job failed");
                }
            }
        }

        debug!("Write queue drained");
        self.idle.notify_waiters();
    }
}

/// Counters describing the serializer's activity since creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SerializerStats {
    /// Number of times a drain loop was started.
    pub loop_starts: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    /// Jobs queued but not yet started.
    pub pending: usize,
    pub running: bool,
}

/// FIFO write queue with a single drain loop.
///
/// Build one per process and hand clones to every writer. Clones share the
/// same queue. Submitting requires a running Tokio runtime because the drain
/// loop is spawned onto it.
#[derive(Clone)]
pub struct WriteSerializer {
    inner: Arc<Inner>,
}

impl WriteSerializer {
    pub fn new(pool: SqlitePool) -> Self {
        WriteSerializer {
            inner: Arc::new(Inner {
                pool,
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    running: false,
                }),
                idle: Notify::new(),
                loop_starts: AtomicU64::new(0),
                jobs_completed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
            }),
        }
    }

    /// Queue a write job and return immediately.
    ///
    /// The job's outcome is not reported back. A failing or panicking job is
    /// logged and skipped; jobs queued after it still run. Use
    /// [`submit`](Self::submit) when the caller needs the result.
    pub fn enqueue_write<F, Fut>(&self, job: F)
    where
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let job: Job = Box::new(move |pool| job(pool).boxed());

        let start_loop = {
            let mut state = self.inner.lock_state();
            state.queue.push_back(job);
            !std::mem::replace(&mut state.running, true)
        };

        if start_loop {
            self.inner.loop_starts.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(self.inner.clone().drain());
        }
    }

    /// Queue a write job and get a handle that resolves to its result.
    ///
    /// The job is queued before this returns, so ordering relative to other
    /// submissions does not depend on when the handle is awaited.
    pub fn submit<T, F, Fut>(&self, job: F) -> WriteHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(SqlitePool) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.enqueue_write(move |pool| async move {
            match job(pool).await {
                Ok(value) => {
                    let _ = tx.send(Ok(value));
                    Ok(())
                }
                Err(err) => {
                    // The caller gets the original error so it can downcast;
                    // the drain loop logs a flattened copy.
                    let logged = anyhow::anyhow!("{:#}", err);
                    let _ = tx.send(Err(err));
                    Err(logged)
                }
            }
        });
        WriteHandle { rx }
    }

    /// Wait until every job queued before this call has settled.
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.submit(|_| async { anyhow::Ok(()) }).await
    }

    /// Wait until no drain loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.inner.lock_state().running {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> SerializerStats {
        let (pending, running) = {
            let state = self.inner.lock_state();
            (state.queue.len(), state.running)
        };
        SerializerStats {
            loop_starts: self.inner.loop_starts.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.inner.jobs_failed.load(Ordering::Relaxed),
            pending,
            running,
        }
    }
}

/// Result of a job queued with [`WriteSerializer::submit`].
#[must_use = "dropping the handle does not cancel the job, but its result is lost"]
pub struct WriteHandle<T> {
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> Future for WriteHandle<T> {
    type Output = Result<T, StoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StoreError::JobExecution(err)),
            // Sender dropped without a value: the job panicked.
            Err(_) => Err(StoreError::JobExecution(anyhow::anyhow!(
                "write job ended without producing a result"
            ))),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, PragmaSettings};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;
    use tokio_test::{assert_pending, assert_ready_ok};

    async fn setup_writer() -> (WriteSerializer, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::initialize(temp_dir.path().join("test.db"), PragmaSettings::default())
            .await
            .expect("initialize failed");
        (WriteSerializer::new(db.pool().clone()), temp_dir)
    }

    #[tokio::test]
    async fn test_submit_returns_job_value() {
        let (writer, _temp) = setup_writer().await;
        let value = writer
            .submit(|pool| async move {
                let row: (i64,) = sqlx::query_as("SELECT 40 + 2").fetch_one(&pool).await?;
                anyhow::Ok(row.0)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_submit_surfaces_job_error() {
        let (writer, _temp) = setup_writer().await;
        let result: Result<(), _> = writer
            .submit(|_| async { Err(anyhow::anyhow!("constraint violated")) })
            .await;
        match result {
            Err(StoreError::JobExecution(err)) => {
                assert!(err.to_string().contains("constraint violated"))
            }
            other => panic!("Expected JobExecution error, got {:?}", other),
        }
        assert_eq!(writer.stats().jobs_failed, 1);
    }

    #[tokio::test]
    async fn test_submit_keeps_sqlx_error_for_caller() {
        let (writer, _temp) = setup_writer().await;
        let result: Result<(), _> = writer
            .submit(|pool| async move {
                sqlx::query("INSERT INTO missing_table (x) VALUES (1)")
                    .execute(&pool)
                    .await?;
                anyhow::Ok(())
            })
            .await;
        match result {
            Err(StoreError::JobExecution(err)) => {
                assert!(matches!(
                    err.downcast_ref::<sqlx::Error>(),
                    Some(sqlx::Error::Database(_))
                ));
            }
            other => panic!("Expected JobExecution error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_panicking_job_is_isolated() {
        let (writer, _temp) = setup_writer().await;
        let ran_after = Arc::new(AtomicUsize::new(0));

        let panicked: WriteHandle<()> = writer.submit(|_| async {
            let explode = true;
            if explode {
                panic!("boom");
            }
            anyhow::Ok(())
        });
        let counter = ran_after.clone();
        writer.enqueue_write(move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });

        assert!(matches!(panicked.await, Err(StoreError::JobExecution(_))));
        writer.wait_idle().await;
        assert_eq!(ran_after.load(Ordering::SeqCst), 1);

        // The same loop survived the panic and ran the next job.
        let stats = writer.stats();
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.loop_starts, 1);
        assert!(!stats.running);
    }

    #[tokio::test]
    async fn test_handle_pending_until_gate_released() {
        let (writer, _temp) = setup_writer().await;
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        writer.enqueue_write(move |_| async move {
            let _ = started_tx.send(());
            let _ = gate_rx.await;
            anyhow::Ok(())
        });
        let mut queued = tokio_test::task::spawn(writer.submit(|_| async { anyhow::Ok(7u8) }));

        started_rx.await.unwrap();
        assert_pending!(queued.poll());
        assert_eq!(writer.stats().pending, 1);

        gate_tx.send(()).unwrap();
        writer.wait_idle().await;
        assert!(queued.is_woken());
        let value = assert_ready_ok!(queued.poll());
        assert_eq!(value, 7);
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*boxed), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*boxed), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(5u32);
        assert_eq!(panic_message(&*boxed), "non-string panic payload");
    }
}
