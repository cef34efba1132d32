use serde::Serialize;

use crate::cicd::CiCdTarget;
use crate::pipeline::CreatedPipeline;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// The app answered the probe with HTTP 200.
    Succeeded,
    /// The pipeline exists but a post-submit step failed or the probe did
    /// not return 200.
    Degraded,
}

/// How waiting for the target to check out the pipeline's source ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InitWait {
    Confirmed { attempts: u32 },
    Unconfirmed { attempts: u32 },
    /// SSH access was never established.
    Skipped,
}

#[derive(Clone, Debug, Serialize)]
pub struct DeploymentOutcome {
    pub status: DeploymentStatus,
    pub pipeline_name: String,
    pub pipeline: CreatedPipeline,
    pub target: CiCdTarget,
    pub init: InitWait,
    /// HTTP status the app answered with, when the probe ran.
    pub probe: Option<u16>,
    pub public_url: Option<String>,
    pub warnings: Vec<String>,
}

impl DeploymentOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == DeploymentStatus::Succeeded
    }
}
