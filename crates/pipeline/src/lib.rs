pub mod config;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod run;
pub mod status;
pub mod topic;

pub use config::{AppConfig, OperationMode, ScorerKind};
pub use error::{DroppedEdge, PipelineError, RunWarning, Stage};
pub use metrics::{Metrics, MetricsSnapshot, TimedOperation};
pub use pool::{PoolClosed, WorkerPool};
pub use run::{Pipeline, RunOutput, RunRequest, run_many};
pub use status::{Checkpoint, LogReporter, StatusReporter};
pub use topic::{DEFAULT_TOPIC, resolve_topic};
