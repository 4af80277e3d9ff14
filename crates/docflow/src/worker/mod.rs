pub mod job;
pub mod pool;
pub mod recovery;
pub mod retry;
pub mod runner;

pub use job::{Job, JobStatus, PayloadError};
pub use pool::WorkerPool;
pub use recovery::{DeadLetterRecovery, RecoveryReport};
pub use retry::RetryPolicy;
pub use runner::{Iteration, JobOutcome, Worker};
