use std::collections::BTreeMap;
use std::path::Path;

/// Serde representation of the pipeline file and base-step inheritance
mod raw;
/// Environment variable and glob expansion of file lists
mod expand;
/// Choosing which steps take part in a run
mod select;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid pipeline file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Step '{0}' names unknown base step '{1}'")]
    UnknownBase(String, String),
    #[error("Base step inheritance cycle involving '{0}'")]
    BaseCycle(String),
    #[error("Invalid glob pattern '{0}': {1}")]
    Pattern(String, glob::PatternError),
    #[error("Error reading glob match for '{0}': {1}")]
    Glob(String, glob::GlobError),
    #[error(transparent)]
    Encoding(#[from] util::PathEncodingError),
    #[error("Step '{0}' does not exist")]
    UnknownStep(String),
    #[error("Step '{0}' is abstract and can't be run")]
    AbstractTarget(String),
}

/// A single fully-resolved build step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    /// Unique name (the key in the pipeline file)
    pub name: String,
    /// Shell text, run with `bash -c`
    pub command: String,
    /// Input files, glob-expanded, sorted and deduplicated
    pub inputs: Vec<String>,
    /// Files this step produces
    pub outputs: Vec<String>,
    /// Extra files removed when cleaning
    pub clean: Vec<String>,
    /// Only run when named as a target
    pub explicit: bool,
    /// Remove outputs if the step fails
    pub delete_on_fail: bool,
    /// Stream child output instead of buffering it
    pub direct: bool,
    /// Extra environment variables for the child process
    pub vars: BTreeMap<String, String>,
}

/// All runnable steps from a pipeline file, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct Pipeline {
    steps: BTreeMap<String, Step>,
    /// names of abstract steps, kept for error messages
    abstracts: Vec<String>,
}

impl Pipeline {
    /// Parse pipeline text. Globs are matched relative to `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self, Error> {
        let raw_steps = raw::parse(text)?;
        let resolved = raw::resolve_inheritance(&raw_steps)?;

        let mut pipeline = Self::default();
        for (name, step) in resolved {
            if step.is_abstract {
                log::debug!("skipping abstract step {name}");
                pipeline.abstracts.push(name);
                continue;
            }
            let step = expand::expand_step(name.clone(), step, base_dir)?;
            pipeline.steps.insert(name, step);
        }
        Ok(pipeline)
    }

    /// Number of runnable steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Iterate over steps in name order.
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.values()
    }

    /// Choose the steps for a run; see [`select::select`].
    pub fn select(&self, targets: &[String]) -> Result<Vec<Step>, Error> {
        select::select(self, targets)
    }

    fn is_abstract(&self, name: &str) -> bool {
        self.abstracts.iter().any(|a| a == name)
    }
}
