// Stage barrier classification

use serde::{Deserialize, Serialize};

/// Outcome of `completeTaskAndCheckStage`, computed under the job row lock
/// from the sibling task counts of a single (jobId, stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    /// Not every sibling task is terminal yet; nothing to do.
    StageContinues,
    /// Every sibling terminated, none failed.
    StageCompleteSuccess,
    /// Every sibling terminated, some failed, policy tolerates it.
    StageCompletePartial,
    /// A failure landed and policy is to stop the job immediately.
    StageFailed,
}

/// Whether a stage that sees any task failure should stop the job outright
/// or continue collecting the remaining (non-final) terminal tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOnAnyFail {
    #[default]
    Stop,
    Continue,
}
