use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use docflow::queue::JobQueue;
use docflow::store::DocumentStore;
use docflow::{
    telemetry, Database, DeadLetterRecovery, ElasticsearchIndexer, LocalFileSource, OcrInvoker,
    PipelineConfig, PipelineContext, RedisQueue, SqliteDocumentStore, WorkerPool,
};
use secrecy::ExposeSecret;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("docflow-worker: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(config.log_format) {
        eprintln!("docflow-worker: {}", e);
    }

    match run(Arc::new(config)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Worker failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<PipelineConfig>) -> docflow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        engine = config.ocr.engine.as_str(),
        queue = %config.queue.queue_name,
        workers = config.queue.concurrency,
        "Starting docflow worker"
    );

    let db = Database::open(&config.connections.database_path)?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db));

    let queue = RedisQueue::connect(config.connections.redis_url.expose_secret()).await?;
    queue.ping().await?;
    let queue: Arc<dyn JobQueue> = Arc::new(queue);

    let indexer = ElasticsearchIndexer::new(&config.connections.elasticsearch)?;
    if let Err(e) = indexer.ensure_index().await {
        warn!(error = %e, "Search index not ready, indexing will be retried per job");
    }

    let files = Arc::new(LocalFileSource::new(&config.connections.storage_root));
    let ocr = OcrInvoker::from_settings(&config.ocr)?;
    let ctx = PipelineContext::new(
        Arc::clone(&config),
        Arc::clone(&queue),
        Arc::clone(&store),
        files,
        Arc::new(indexer),
        ocr,
    )?;

    let recovery = DeadLetterRecovery::new(queue, store, config.queue.dead_letter_queue.clone());
    if let Err(e) = recovery.run().await {
        warn!(error = %e, "Startup dead-letter recovery failed");
    }

    let pool = WorkerPool::start(ctx, config.queue.concurrency);
    let shutdown = pool.shutdown_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown.store(true, Ordering::Relaxed);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    pool.wait().await;
    info!("docflow worker stopped");
    Ok(())
}
