use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info};
use tokio::task::JoinHandle;

use crate::pipeline::PipelineContext;

use super::runner::Worker;

/// Independent sequential workers sharing one shutdown flag.
///
/// Each worker handles one job at a time; the pool only multiplies
/// consumers, it never parallelizes a single job.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers (at least one) on the current runtime.
    pub fn start(ctx: PipelineContext, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let workers = (0..worker_count)
            .map(|worker_id| {
                let worker = Worker::new(worker_id, ctx.clone());
                let shutdown_flag = Arc::clone(&shutdown);
                tokio::spawn(async move { worker.run(shutdown_flag).await })
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self { workers, shutdown }
    }

    /// Flag that stops every worker once set, e.g. from a signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Waits for every worker to finish its current job and exit.
    pub async fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}
