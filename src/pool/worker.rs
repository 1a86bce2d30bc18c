use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Notify;

/// A type-erased unit of work. Each network handler boxes its per-connection
/// routine into one of these before handing it to the pool.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Shared {
    name: String,
    queue: Mutex<VecDeque<Job>>,
    available: Notify,
}

impl Shared {
    /// Parks until a job is available and pops it from the front.
    async fn next_job(&self) -> Job {
        loop {
            let (job, remaining) = {
                let mut queue = self.queue.lock();
                let job = queue.pop_front();
                (job, queue.len())
            };

            if let Some(job) = job {
                // Hand leftover work to another parked worker.
                if remaining > 0 {
                    self.available.notify_one();
                }
                return job;
            }

            self.available.notified().await;
        }
    }
}

/// Fixed-size group of workers over one FIFO queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    worker_count: usize,
}

impl WorkerPool {
    /// Starts `worker_count` workers. Must be called from inside a tokio runtime.
    ///
    /// A pool of zero workers would never run anything, so at least one
    /// worker is always started.
    pub fn new(name: &str, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shared = Arc::new(Shared {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        });

        for worker_id in 0..worker_count {
            let shared = shared.clone();
            tokio::spawn(async move {
                worker_loop(shared, worker_id).await;
            });
        }

        tracing::info!("Worker pool '{}' started with {} workers", name, worker_count);

        Self {
            shared,
            worker_count,
        }
    }

    /// Appends a job to the tail of the queue and wakes one parked worker.
    pub fn submit<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shared.queue.lock().push_back(Box::pin(job));
        self.shared.available.notify_one();
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Jobs submitted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }
}

/// The main loop for a single worker: dequeue, run, repeat forever.
///
/// The job runs on its own task so a panicking job is reported and the
/// worker survives to take the next one.
async fn worker_loop(shared: Arc<Shared>, worker_id: usize) {
    tracing::debug!("Worker {} of pool '{}' started", worker_id, shared.name);

    loop {
        let job = shared.next_job().await;
        tracing::trace!("Worker {} of pool '{}' picked a job", worker_id, shared.name);

        if let Err(e) = tokio::spawn(job).await {
            tracing::error!(
                "Job on worker {} of pool '{}' did not complete: {}",
                worker_id,
                shared.name,
                e
            );
        }
    }
}
