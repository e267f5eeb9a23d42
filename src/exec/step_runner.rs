use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio::process::Command;

use broadcast::Bus;
use pipeline::Step;
use util::{HashMap, HashSet, Timer};

use crate::fs;

use super::decide::{Decider, Decision, TimeDecider};
use super::orchestrator::StepReport;
use super::run_cmd::{run_cmd, Buffered, OutputSink, Passthrough};
use super::{Error, ExecutionState, Level, Reporter};

/// How many steps of a run declare each output file.
#[derive(Debug, Default, Clone)]
pub struct Producers {
    counts: HashMap<String, usize>,
}

impl Producers {
    /// Number of steps declaring `file` as an output.
    pub fn count(&self, file: &str) -> usize {
        self.counts.get(file).copied().unwrap_or(0)
    }

    /// Number of distinct output files.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<'a> FromIterator<&'a Step> for Producers {
    fn from_iter<I: IntoIterator<Item = &'a Step>>(steps: I) -> Self {
        let mut counts = HashMap::default();
        for step in steps {
            // a step naming the same output twice is still one producer
            let outputs: HashSet<&str> = step.outputs.iter().map(String::as_str).collect();
            for output in outputs {
                *counts.entry(output.to_owned()).or_insert(0) += 1;
            }
        }
        Self { counts }
    }
}

/// A single step while it runs.
///
/// Waits on the bus until every step producing one of its inputs has
/// announced that file, decides whether it needs to run, runs its command,
/// checks the result, then announces its own outputs. Outputs are announced
/// whether the step succeeded or not, so that nothing waits on it forever.
pub struct StepRunner {
    step: Step,
    /// inputs that some other step in this run produces
    deps: Vec<String>,
    state: ExecutionState,
    error: Option<Error>,
    bus: Bus,
    reporter: Arc<dyn Reporter>,
    decider: Arc<dyn Decider>,
    /// run-wide variables added to every child environment
    env: Arc<[(String, String)]>,
    /// where the command runs and relative file names are resolved
    workdir: PathBuf,
}

impl StepRunner {
    /// Create an unstarted runner. `producers` counts the outputs of every
    /// step in the run; inputs that some other step produces become dependencies.
    pub fn new(
        step: Step,
        producers: &Producers,
        bus: Bus,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let mut deps = Vec::with_capacity(step.inputs.len());
        for file in &step.inputs {
            let others = match producers.count(file) {
                0 => continue,
                n if step.outputs.contains(file) => n - 1,
                n => n,
            };
            if others == 0 {
                reporter.record(
                    Level::Verbose,
                    &format!("{}: only this step produces {file}, not waiting on it", step.name),
                );
                continue;
            }
            deps.push(file.clone());
        }

        reporter.record(
            Level::Verbose,
            &format!("{}: Found {} deps", step.name, deps.len()),
        );
        for (k, v) in &step.vars {
            reporter.record(Level::Verbose, &format!("{}: var[{k}]=='{v}'", step.name));
        }

        Self {
            step,
            deps,
            state: ExecutionState::Unstarted,
            error: None,
            bus,
            reporter,
            decider: Arc::new(TimeDecider::default()),
            env: Arc::from(Vec::new()),
            workdir: PathBuf::new(),
        }
    }

    /// Use a different build decider.
    pub fn with_decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    /// Variables to add to the child environment, before the step's own.
    pub fn with_env(mut self, env: Arc<[(String, String)]>) -> Self {
        self.env = env;
        self
    }

    /// Run the command in `workdir` and resolve relative outputs against it.
    /// The decider is not changed; give it the same root.
    pub fn with_workdir(mut self, workdir: PathBuf) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn name(&self) -> &str {
        &self.step.name
    }

    pub fn deps(&self) -> &[String] {
        &self.deps
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn into_report(self) -> StepReport {
        StepReport {
            step: self.step,
            state: self.state,
            error: self.error,
        }
    }

    /// Run the step. Always leaves it in a terminal state.
    pub async fn run(&mut self) {
        let timer = Timer::now();

        if AssertUnwindSafe(self.drive()).catch_unwind().await.is_err() {
            self.report(Level::Failure, "panicked while running");
        }

        if !self.state.is_terminal() {
            self.report(
                Level::Failure,
                "FAILURE TO CLEANLY FINISH STATE - this is a bug",
            );
            self.fail(Error::Indeterminate).await;
        }

        self.report(Level::Verbose, &timer.describe_elapsed("step"));
    }

    /// Every return path calls `succeed` or `fail`.
    async fn drive(&mut self) {
        self.state = ExecutionState::Started;

        if let Err(e) = self.wait_for_deps().await {
            return self.fail(e).await;
        }

        let decision = match self.decider.decide(&self.step.inputs, &self.step.outputs) {
            Ok(decision) => decision,
            Err(e) => {
                self.report(Level::Verbose, "failing on build decision");
                return self.fail(Error::Decide(e)).await;
            }
        };
        if !decision.need_build() {
            self.report(Level::Verbose, "Nothing to do");
            return self.succeed().await;
        }
        self.report(Level::Verbose, &format!("building because {decision:?}"));

        self.state = ExecutionState::Executing;
        self.report(Level::Info, &self.step.command);

        if let Err(e) = self.execute().await {
            return self.fail(e).await;
        }
        match self.verify() {
            Ok(()) => self.succeed().await,
            Err(e) => self.fail(e).await,
        }
    }

    /// Block until every dependency has been announced on the bus.
    async fn wait_for_deps(&self) -> Result<(), Error> {
        if self.deps.is_empty() {
            return Ok(());
        }

        let mut waiting: HashSet<&str> = self.deps.iter().map(String::as_str).collect();
        self.report(
            Level::Verbose,
            &format!("waiting for {} deps", waiting.len()),
        );

        let mut listener = self.bus.subscribe().await?;
        while let Some(msg) = listener.recv().await {
            waiting.remove(msg.payload.as_str());
            if waiting.is_empty() {
                // have everything we need
                listener.respond(false).await;
                self.report(Level::Verbose, "all deps are done - proceeding");
                return Ok(());
            }
            listener.respond(true).await;
        }

        self.report(
            Level::Verbose,
            &format!("{} deps will never finish, exiting", waiting.len()),
        );
        Err(Error::DepsNeverFinished(waiting.len()))
    }

    async fn execute(&self) -> Result<(), Error> {
        let mut cmd = self.command();

        let mut stdout: Box<dyn OutputSink> = if self.step.direct {
            Box::new(Passthrough::stdout())
        } else {
            Box::<Buffered>::default()
        };
        let mut stderr: Box<dyn OutputSink> = if self.step.direct {
            Box::new(Passthrough::stderr())
        } else {
            Box::<Buffered>::default()
        };

        let status = run_cmd(&mut cmd, stdout.as_mut(), stderr.as_mut())
            .await
            .map_err(Error::Spawn)?;

        self.log_output("stdout", Level::Verbose, stdout.take_text());
        self.log_output("stderr", Level::Info, stderr.take_text());

        if !status.success() {
            return Err(Error::SubprocessFailed(status));
        }
        Ok(())
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("/usr/bin/env");
        cmd.arg("bash").arg("-c").arg(&self.step.command);
        if !self.workdir.as_os_str().is_empty() {
            cmd.current_dir(&self.workdir);
        }

        for (k, v) in self.env.iter() {
            cmd.env(k, v);
        }
        cmd.env("DMK_STEPNAME", &self.step.name)
            .env("DMK_INPUTS", self.step.inputs.join(":"))
            .env("DMK_OUTPUTS", self.step.outputs.join(":"))
            .env("DMK_CLEAN", self.step.clean.join(":"));
        for (k, v) in &self.step.vars {
            cmd.env(k, v);
        }
        cmd
    }

    fn log_output(&self, stream: &str, level: Level, text: Option<String>) {
        let Some(text) = text else {
            return;
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let name = &self.step.name;
        self.reporter.record(
            level,
            &format!("{name} {stream} begin---\n{text}\n---{stream} end for {name}"),
        );
    }

    /// Check that the command really brought the outputs up to date.
    fn verify(&self) -> Result<(), Error> {
        let decision = self
            .decider
            .decide(&self.step.inputs, &self.step.outputs)
            .map_err(Error::DecideAfterBuild)?;
        match decision {
            Decision::OutputMissing(file) => return Err(Error::ExpectedFileNotFound(file)),
            d if !d.satisfied_after_build() => return Err(Error::StillNeedsBuild),
            _ => {}
        }

        for file in &self.step.outputs {
            if !fs::exists(self.workdir.join(file)) {
                return Err(Error::ExpectedFileNotFound(file.clone()));
            }
        }
        Ok(())
    }

    /// Tell everyone that our outputs are done (even if we failed).
    async fn notify(&self) {
        for file in &self.step.outputs {
            self.report(Level::Verbose, &format!("notifying for {file}"));
            if let Err(e) = self.bus.publish(file.as_str()).await {
                self.report(
                    Level::Verbose,
                    &format!("ERROR on broadcast send for {file} - {e}"),
                );
            }
        }
    }

    async fn fail(&mut self, e: Error) {
        self.notify().await;
        self.state = ExecutionState::Failed;
        self.report(Level::Failure, &format!("FAIL - {e}"));
        self.error = Some(e);
    }

    async fn succeed(&mut self) {
        self.notify().await;
        self.state = ExecutionState::Completed;
        self.report(Level::Success, "Complete");
    }

    fn report(&self, level: Level, msg: &str) {
        self.reporter
            .record(level, &format!("{}: {msg}", self.step.name));
    }
}
