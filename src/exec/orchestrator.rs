use std::path::PathBuf;
use std::sync::Arc;

use broadcast::Broadcaster;
use pipeline::Step;

use super::decide::{Decider, TimeDecider};
use super::{Error, ExecutionState, Level, Producers, Reporter, StepRunner};

/// How a single step ended.
#[derive(Debug)]
pub struct StepReport {
    pub step: Step,
    pub state: ExecutionState,
    /// Set when `state` is `Failed`.
    pub error: Option<Error>,
}

impl StepReport {
    pub fn failed(&self) -> bool {
        self.state == ExecutionState::Failed
    }
}

/// Terminal states of every step in a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<StepReport>,
    /// Steps whose task ended without reaching a terminal state.
    pub lost: Vec<String>,
}

impl RunSummary {
    pub fn failed(&self) -> impl Iterator<Item = &StepReport> {
        self.reports.iter().filter(|r| r.failed())
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn get(&self, name: &str) -> Option<&StepReport> {
        self.reports.iter().find(|r| r.step.name == name)
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0 && self.lost.is_empty()
    }

    /// Number of failed steps, plus one if any step never finished at all.
    pub fn exit_code(&self) -> i32 {
        let lost = if self.lost.is_empty() { 0 } else { 1 };
        i32::try_from(self.failure_count() + lost).unwrap_or(i32::MAX)
    }
}

/// Runs every step of a build at once, letting each one wait on the bus
/// for the steps it depends on.
pub struct Orchestrator {
    reporter: Arc<dyn Reporter>,
    /// defaults to a `TimeDecider` rooted at `workdir`
    decider: Option<Arc<dyn Decider>>,
    env: Arc<[(String, String)]>,
    workdir: PathBuf,
}

impl Orchestrator {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            decider: None,
            env: Arc::from(Vec::new()),
            workdir: PathBuf::new(),
        }
    }

    /// Variables added to every step's child environment.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = Arc::from(env);
        self
    }

    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    /// Directory that commands run in and relative file names are resolved against.
    pub fn with_workdir<P: Into<PathBuf>>(mut self, workdir: P) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Run all `steps` concurrently and wait for every one of them to finish.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn run(&self, steps: Vec<Step>) -> Result<RunSummary, Error> {
        let producers: Producers = steps.iter().collect();
        log::debug!(
            "{} steps declare {} distinct outputs",
            steps.len(),
            producers.len()
        );

        let decider = match &self.decider {
            Some(decider) => decider.clone(),
            None => Arc::new(TimeDecider::new(&self.workdir)),
        };

        let mut broadcaster = Broadcaster::new();
        broadcaster.start()?;
        let bus = broadcaster.bus()?;

        let mut running = Vec::with_capacity(steps.len());
        for step in steps {
            self.reporter
                .record(Level::Verbose, &format!("Starting step {}", step.name));
            let name = step.name.clone();
            let mut runner = StepRunner::new(step, &producers, bus.clone(), self.reporter.clone())
                .with_decider(decider.clone())
                .with_env(self.env.clone())
                .with_workdir(self.workdir.clone());
            let handle = tokio::spawn(async move {
                runner.run().await;
                runner.into_report()
            });
            running.push((name, handle));
        }
        drop(bus);

        let mut summary = RunSummary::default();
        for (name, handle) in running {
            match handle.await {
                Ok(report) if report.state.is_terminal() => summary.reports.push(report),
                Ok(report) => {
                    self.reporter.record(
                        Level::Failure,
                        &format!("{name}: finished in state {:?}", report.state),
                    );
                    summary.lost.push(name);
                }
                Err(e) => {
                    self.reporter
                        .record(Level::Failure, &format!("{name}: never finished: {e}"));
                    summary.lost.push(name);
                }
            }
        }

        broadcaster.stop().await;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::Path;
    use tempfile::tempdir;

    struct Quiet;

    impl Reporter for Quiet {
        fn record(&self, _: Level, _: &str) {}
    }

    fn path(dir: &Path, name: &str) -> String {
        dir.join(name).to_str().expect("utf-8 temp path").to_owned()
    }

    fn step(name: &str, command: &str, inputs: &[&String], outputs: &[&String]) -> Step {
        Step {
            name: name.to_owned(),
            command: command.to_owned(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            ..Step::default()
        }
    }

    #[tokio::test]
    async fn test_one_failure_among_three() -> Result<()> {
        let dir = tempdir()?;
        let (a, b, c) = (path(dir.path(), "a"), path(dir.path(), "b"), path(dir.path(), "c"));
        let steps = vec![
            step("good1", "touch \"$DMK_OUTPUTS\"", &[], &[&a]),
            step("bad", "exit 7", &[], &[&b]),
            step("good2", "sleep 0.1; touch \"$DMK_OUTPUTS\"", &[], &[&c]),
        ];

        let summary = Orchestrator::new(Arc::new(Quiet)).run(steps).await?;
        assert_eq!(summary.failure_count(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert!(!summary.is_success());
        assert_eq!(summary.get("good1").map(|r| r.state), Some(ExecutionState::Completed));
        assert_eq!(summary.get("good2").map(|r| r.state), Some(ExecutionState::Completed));
        assert!(summary.get("bad").is_some_and(|r| r.failed()));
        Ok(())
    }

    #[tokio::test]
    async fn test_diamond() -> Result<()> {
        let dir = tempdir()?;
        let src = path(dir.path(), "src");
        let left = path(dir.path(), "left");
        let right = path(dir.path(), "right");
        let joined = path(dir.path(), "joined");
        let steps = vec![
            step("join", &format!("cat {left} {right} > {joined}"), &[&left, &right], &[&joined]),
            step("left", &format!("sleep 0.1; sed s/x/L/ {src} > {left}"), &[&src], &[&left]),
            step("right", &format!("sed s/x/R/ {src} > {right}"), &[&src], &[&right]),
            step("root", &format!("sleep 0.1; echo x > {src}"), &[], &[&src]),
        ];

        let summary = Orchestrator::new(Arc::new(Quiet)).run(steps).await?;
        assert!(summary.is_success());
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(std::fs::read_to_string(&joined)?, "L\nR\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_reaches_dependents() -> Result<()> {
        let dir = tempdir()?;
        let first = path(dir.path(), "first");
        let second = path(dir.path(), "second");
        let steps = vec![
            step("first", "exit 1", &[], &[&first]),
            step("second", &format!("cat {first} > {second}"), &[&first], &[&second]),
        ];

        let summary = Orchestrator::new(Arc::new(Quiet)).run(steps).await?;
        assert_eq!(summary.failure_count(), 2);
        assert_eq!(summary.exit_code(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_wide_env() -> Result<()> {
        let dir = tempdir()?;
        let out = path(dir.path(), "out");
        let steps = vec![step("env", "echo \"$DMK_VERSION\" > \"$DMK_OUTPUTS\"", &[], &[&out])];

        let summary = Orchestrator::new(Arc::new(Quiet))
            .with_env(vec![("DMK_VERSION".to_owned(), "9.9.9".to_owned())])
            .run(steps)
            .await?;
        assert!(summary.is_success());
        assert_eq!(std::fs::read_to_string(&out)?, "9.9.9\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_workdir() -> Result<()> {
        let dir = tempdir()?;
        let made = "made.txt".to_owned();
        let copied = "copied.txt".to_owned();
        let steps = vec![
            step("copy", "cp made.txt copied.txt", &[&made], &[&copied]),
            step("make", "echo hi > made.txt", &[], &[&made]),
        ];

        let summary = Orchestrator::new(Arc::new(Quiet))
            .with_workdir(dir.path())
            .run(steps)
            .await?;
        assert!(summary.is_success());
        assert_eq!(std::fs::read_to_string(dir.path().join("copied.txt"))?, "hi\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_step_updating_its_own_output_waits_for_producer() -> Result<()> {
        let dir = tempdir()?;
        let x = "x.txt".to_owned();
        let steps = vec![
            step("append", "echo appended >> x.txt; echo append >> order.log", &[&x], &[&x]),
            step("make", "sleep 0.3; echo made > x.txt; echo make >> order.log", &[], &[&x]),
        ];

        let summary = Orchestrator::new(Arc::new(Quiet))
            .with_workdir(dir.path())
            .run(steps)
            .await?;
        assert!(summary.is_success());
        // append only looks at x.txt after make announced it, and finds it up to date
        assert_eq!(std::fs::read_to_string(dir.path().join("order.log"))?, "make\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("x.txt"))?, "made\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_nothing_to_run() -> Result<()> {
        let summary = Orchestrator::new(Arc::new(Quiet)).run(Vec::new()).await?;
        assert!(summary.reports.is_empty());
        assert!(summary.is_success());
        Ok(())
    }

    #[test]
    fn test_exit_code_counts_lost_steps_once() {
        let report = |name: &str, state| StepReport {
            step: Step {
                name: name.to_owned(),
                ..Step::default()
            },
            state,
            error: None,
        };
        let summary = RunSummary {
            reports: vec![
                report("ok", ExecutionState::Completed),
                report("bad1", ExecutionState::Failed),
                report("bad2", ExecutionState::Failed),
            ],
            lost: vec!["gone1".to_owned(), "gone2".to_owned()],
        };
        assert_eq!(summary.failure_count(), 2);
        assert_eq!(summary.exit_code(), 3);
    }
}
