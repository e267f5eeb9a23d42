/// Whether a step needs to run
pub mod decide;
pub use decide::{Decider, Decision, TimeDecider};

/// Run a subprocess
mod run_cmd;
pub use run_cmd::{Buffered, OutputSink, Passthrough};

/// One running step
mod step_runner;
pub use step_runner::{Producers, StepRunner};

/// Runs all steps concurrently
mod orchestrator;
pub use orchestrator::{Orchestrator, RunSummary, StepReport};

use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Broadcaster done, still have {0} deps")]
    DepsNeverFinished(usize),
    #[error("Unable to use broadcaster: {0}")]
    Bus(#[from] broadcast::Error),
    #[error("Build decision failed: {0}")]
    Decide(#[source] decide::Error),
    #[error("Build decider check failed AFTER build: {0}")]
    DecideAfterBuild(#[source] decide::Error),
    #[error("Failed to execute command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Subprocess failed with {0}")]
    SubprocessFailed(ExitStatus),
    #[error("Build still required after command finished")]
    StillNeedsBuild,
    #[error("Expected file not found: {0}")]
    ExpectedFileNotFound(String),
    #[error("Build step instance state indeterminate")]
    Indeterminate,
}

/// Lifecycle of a single step. Only `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Unstarted,
    Started,
    Executing,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How important a reported line is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Only shown with `-v`
    Verbose,
    Info,
    Success,
    Failure,
}

/// Somewhere to send user-facing progress lines.
///
/// Passed explicitly into the orchestrator and every step runner.
pub trait Reporter: Send + Sync {
    fn record(&self, level: Level, line: &str);
}
