use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    ExtractionComplete,
    AssemblyComplete,
    PathwaySelected,
    ReportRendered,
}

impl Checkpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::ExtractionComplete => "extraction complete",
            Checkpoint::AssemblyComplete => "assembly complete",
            Checkpoint::PathwaySelected => "pathway selected",
            Checkpoint::ReportRendered => "report rendered",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives progress for a run. Failures are logged by the pipeline and
/// never fail the run.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, run_id: Uuid, checkpoint: Checkpoint) -> Result<()>;
}

/// Reports checkpoints as log lines.
pub struct LogReporter;

#[async_trait]
impl StatusReporter for LogReporter {
    async fn report(&self, run_id: Uuid, checkpoint: Checkpoint) -> Result<()> {
        info!(%run_id, checkpoint = checkpoint.as_str(), "Run progress");
        Ok(())
    }
}
