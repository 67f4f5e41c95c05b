//! Fixed-size worker pool
//!
//! Jobs go through an unbounded crossbeam channel that every worker receives
//! from. Dropping the pool closes the channel and joins the workers. A job
//! that panics is logged and the worker keeps serving.

use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// The pool can no longer accept jobs
#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool has shut down")]
pub struct PoolShutDown;

/// Pool of threads executing boxed jobs
pub struct WorkerPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one)
    pub fn new(size: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|id| Worker::new(id, receiver.clone()))
            .collect();
        log::debug!("Started worker pool with {} threads", size.max(1));
        Self {
            workers,
            sender: Some(sender),
        }
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job
    pub fn execute<F>(&self, job: F) -> Result<(), PoolShutDown>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .as_ref()
            .ok_or(PoolShutDown)?
            .send(Box::new(job))
            .map_err(|_| PoolShutDown)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.workers.len())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if let Some(thread) = worker.thread {
                if thread.join().is_err() {
                    log::error!("Worker {} exited abnormally", worker.id);
                }
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Job>) -> Self {
        let thread = thread::Builder::new()
            .name(format!("cull-worker-{id}"))
            .spawn(move || {
                for job in receiver.iter() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("Job panicked on worker {}", id);
                    }
                }
            });
        match thread {
            Ok(handle) => Self {
                id,
                thread: Some(handle),
            },
            Err(err) => {
                log::error!("Failed to spawn worker {}: {}", id, err);
                Self { id, thread: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_jobs_run_before_drop_returns() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(3);
            assert_eq!(pool.size(), 3);
            for _ in 0..32 {
                let counter = Arc::clone(&counter);
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = crossbeam::channel::bounded(1);
        pool.execute(|| panic!("boom")).unwrap();
        pool.execute(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv().unwrap(), 7);
    }
}
