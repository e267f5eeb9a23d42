use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;

use pipeline::{Pipeline, Step};

use crate::clean::Cleaner;
use crate::exec::{Orchestrator, RunSummary};
use crate::settings::{Action, Settings};
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let ui = Ui::new(&settings);
        Self { settings, ui }
    }

    /// Run the app; returns the process exit code.
    pub fn run(mut self) -> Result<i32> {
        let dir = self.settings.pipeline_dir()?.to_path_buf();
        let pipeline = self.load_pipeline(&dir)?;
        let steps = pipeline
            .select(&self.settings.targets)
            .context("while choosing steps to run")?;

        match self.settings.action {
            Action::List => {
                self.list(&steps);
                Ok(0)
            }
            Action::Clean => {
                let errors = Cleaner::new(&dir, &self.ui).clean(&steps);
                Ok(errors.try_into().unwrap_or(i32::MAX))
            }
            Action::Build => self.build(&dir, steps),
        }
    }
}

// LOADING //////////////////
impl App {
    fn load_pipeline(&mut self, dir: &Path) -> Result<Pipeline> {
        self.ui.verbose_msg(&format!("Pipeline file: {:?}", self.settings.pipeline));
        let text = std::fs::read_to_string(&self.settings.pipeline).with_context(|| {
            format!("while reading pipeline file {:?}", self.settings.pipeline)
        })?;
        log::debug!("read {} bytes", text.len());

        self.ui.verbose_progress("Parsing pipeline file");
        self.ui.start_timer();
        let pipeline = Pipeline::parse(&text, dir).with_context(|| {
            format!("while parsing pipeline file {:?}", self.settings.pipeline)
        })?;
        self.ui.done();
        self.ui.print_elapsed("Parsing pipeline file");

        self.ui.verbose_msg(&format!("Found {} build steps", pipeline.len()));
        Ok(pipeline)
    }

    fn list(&self, steps: &[Step]) {
        for step in steps {
            println!("{}", step.name.cyan());
            println!("  inputs:  {}", step.inputs.join(" "));
            println!("  outputs: {}", step.outputs.join(" "));
        }
    }
}

// RUNNING /////////////////
impl App {
    fn build(mut self, dir: &Path, steps: Vec<Step>) -> Result<i32> {
        if steps.is_empty() {
            eprintln!("{}", "No steps to run; exiting.".green());
            return Ok(0);
        }
        let env = vec![
            ("DMK_VERSION".to_owned(), env!("CARGO_PKG_VERSION").to_owned()),
            (
                "DMK_PIPELINE".to_owned(),
                self.settings.pipeline.to_string_lossy().into_owned(),
            ),
        ];
        let orchestrator = Orchestrator::new(Arc::new(self.ui.clone()))
            .with_env(env)
            .with_workdir(dir);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("while starting async runtime")?;

        self.ui.start_timer();
        let summary = runtime
            .block_on(orchestrator.run(steps))
            .context("while running pipeline")?;
        self.ui.print_elapsed("Build");

        if self.settings.delete_on_fail {
            let cleaner = Cleaner::new(dir, &self.ui);
            for failed in summary.failed().filter(|r| r.step.delete_on_fail) {
                cleaner.delete_outputs(&failed.step);
            }
        }

        self.print_summary(&summary);
        Ok(summary.exit_code())
    }

    fn print_summary(&self, summary: &RunSummary) {
        if summary.is_success() {
            eprintln!("{}", "Build complete.".green());
            return;
        }
        for report in summary.failed() {
            match &report.error {
                Some(e) => eprintln!("{} {}: {}", "FAILED".red(), report.step.name, e),
                None => eprintln!("{} {}", "FAILED".red(), report.step.name),
            }
        }
        if !summary.lost.is_empty() {
            eprintln!("{} never finished: {}", "ERROR".red(), summary.lost.join(", "));
        }
    }
}
