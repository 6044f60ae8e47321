/// Worker pools for crypto and disk jobs
///
/// [`ThreadPool`] runs jobs on a fixed set of named OS threads.
/// [`SyncPool`] keeps the same contract but runs jobs inline when ticked,
/// for single-threaded embedding and tests.
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to run blocking work off the logic thread
pub trait WorkQueue: Send + Sync {
    /// Queue a job; silently ignored once the queue is stopped
    fn queue_job(&self, job: Job);
}

/// Take a lock even if a job panicked while holding it
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_job(job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        error!("Worker job panicked");
    }
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    stopped: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    cond: Condvar,
}

/// Fixed-size pool of worker threads over a FIFO job queue
///
/// `stop` wakes every worker; jobs already queued still run before the
/// workers exit, and `join` waits for that to finish.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(workers: usize, name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState::default()),
            cond: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || Self::worker_loop(&shared))?;
            handles.push(handle);
        }
        debug!("Started {} {} workers", workers, name);

        Ok(Self {
            shared,
            workers: Mutex::new(handles),
        })
    }

    fn worker_loop(shared: &Shared) {
        loop {
            let job = {
                let mut state = lock(&shared.state);
                while state.jobs.is_empty() && !state.stopped {
                    state = shared
                        .cond
                        .wait(state)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                match state.jobs.pop_front() {
                    Some(job) => job,
                    None => return,
                }
            };
            run_job(job);
        }
    }

    /// Refuse new jobs and wake every worker
    pub fn stop(&self) {
        lock(&self.shared.state).stopped = true;
        self.shared.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        lock(&self.shared.state).stopped
    }

    /// Wait for every worker to exit; call after [`ThreadPool::stop`]
    pub fn join(&self) {
        let handles: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                error!("Worker thread exited abnormally");
            }
        }
    }

    /// Number of jobs waiting for a worker
    pub fn pending(&self) -> usize {
        lock(&self.shared.state).jobs.len()
    }
}

impl WorkQueue for ThreadPool {
    fn queue_job(&self, job: Job) {
        {
            let mut state = lock(&self.shared.state);
            if state.stopped {
                return;
            }
            state.jobs.push_back(job);
        }
        self.shared.cond.notify_one();
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

/// Same-thread pool: jobs wait in a FIFO until [`SyncPool::tick`]
#[derive(Default)]
pub struct SyncPool {
    state: Mutex<QueueState>,
}

impl SyncPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run queued jobs in order until the queue is empty
    ///
    /// Jobs queued by a running job also run before this returns.
    pub fn tick(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = lock(&self.state).jobs.pop_front();
            match job {
                Some(job) => {
                    run_job(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    pub fn stop(&self) {
        lock(&self.state).stopped = true;
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).jobs.len()
    }
}

impl WorkQueue for SyncPool {
    fn queue_job(&self, job: Job) {
        let mut state = lock(&self.state);
        if !state.stopped {
            state.jobs.push_back(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_every_job_runs_once() {
        let pool = ThreadPool::new(4, "test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            pool.queue_job(counting_job(&counter));
        }
        pool.stop();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_no_jobs_after_stop() {
        let pool = ThreadPool::new(2, "test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.stop();
        pool.queue_job(counting_job(&counter));
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pool.pending(), 0);
        assert!(pool.is_stopped());
    }

    #[test]
    fn test_join_waits_for_workers() {
        let pool = ThreadPool::new(2, "test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let counter = counter.clone();
            pool.queue_job(Box::new(move || {
                thread::sleep(std::time::Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        pool.join();
        // all workers have exited, so nothing can still be running
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert!(lock(&pool.workers).is_empty());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = ThreadPool::new(1, "test").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.queue_job(Box::new(|| panic!("boom")));
        pool.queue_job(counting_job(&counter));
        pool.stop();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_sync_pool_runs_on_tick() {
        let pool = SyncPool::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            pool.queue_job(Box::new(move || order.lock().unwrap().push(i)));
        }
        assert!(order.lock().unwrap().is_empty());
        assert_eq!(pool.tick(), 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

        pool.stop();
        pool.queue_job(Box::new(|| panic!("must not run")));
        assert_eq!(pool.tick(), 0);
    }
}
