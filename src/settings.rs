use std::path::{Path, PathBuf};

use anyhow::Result;

use util::first_file_found;

use crate::args::Args;

/// Pipeline file names tried in order when `-f` isn't given.
pub const DEFAULT_PIPELINES: [&str; 6] = [
    "Pipeline",
    "pipeline",
    "Pipeline.yaml",
    "pipeline.yaml",
    "Pipeline.yml",
    "pipeline.yml",
];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Pipeline file {0:?} does not exist")]
    PipelineNotFound(PathBuf),
    #[error("No pipeline file found (tried {})", DEFAULT_PIPELINES.join(", "))]
    NoDefaultPipeline,
    #[error("Invalid pipeline path has no parent (should not happen)")]
    PipelineHasNoParent,
    #[error("--clean and --list can't be used together")]
    ConflictingActions,
}

/// What a run does with the selected steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Build,
    Clean,
    List,
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    /// canonical path to the pipeline file
    pub pipeline: PathBuf,
    pub verbose: u8,
    pub targets: Vec<String>,
    pub action: Action,
    pub delete_on_fail: bool,
}

impl Settings {
    /// Canonicalized parent dir of the pipeline file; steps run here.
    pub fn pipeline_dir(&self) -> Result<&Path, Error> {
        self.pipeline.parent().ok_or(Error::PipelineHasNoParent)
    }
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let action = match (args.clean, args.list) {
            (true, true) => return Err(Error::ConflictingActions.into()),
            (true, false) => Action::Clean,
            (false, true) => Action::List,
            (false, false) => Action::Build,
        };

        let pipeline = match &args.pipeline {
            Some(given) => {
                let path = PathBuf::from(given);
                if !path.is_file() {
                    return Err(Error::PipelineNotFound(path).into());
                }
                path
            }
            None => first_file_found(&DEFAULT_PIPELINES)
                .map(PathBuf::from)
                .ok_or(Error::NoDefaultPipeline)?,
        };
        let pipeline = pipeline.canonicalize()?;

        Ok(Self {
            pipeline,
            verbose: args.verbose,
            targets: args.steps,
            action,
            delete_on_fail: !args.no_delete_on_fail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_given_pipeline() -> Result<()> {
        let dir = tempdir()?;
        let file = dir.path().join("build.yaml");
        std::fs::write(&file, "")?;

        let args = Args {
            pipeline: Some(file.to_str().expect("utf-8").to_owned()),
            list: true,
            steps: vec!["a".to_owned()],
            ..Args::default()
        };
        let settings = Settings::try_from(args)?;
        assert_eq!(settings.pipeline, file.canonicalize()?);
        assert_eq!(settings.pipeline_dir()?, dir.path().canonicalize()?);
        assert_eq!(settings.action, Action::List);
        assert_eq!(settings.targets, ["a"]);
        assert!(settings.delete_on_fail);
        Ok(())
    }

    #[test]
    fn test_missing_pipeline() {
        let args = Args {
            pipeline: Some("/no/such/Pipeline".to_owned()),
            ..Args::default()
        };
        let err = Settings::try_from(args).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::PipelineNotFound(_))));
    }

    #[test]
    fn test_conflicting_actions() {
        let args = Args {
            clean: true,
            list: true,
            ..Args::default()
        };
        let err = Settings::try_from(args).unwrap_err();
        assert!(matches!(err.downcast_ref(), Some(Error::ConflictingActions)));
    }
}
