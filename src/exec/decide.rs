use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::fs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Nothing to build")]
    NothingToBuild,
    #[error("Missing a dependency: cannot build ({0})")]
    MissingInput(String),
    #[error("Error checking '{0}': {1}")]
    Io(String, #[source] io::Error),
}

/// Why a step does or does not need to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// This declared output doesn't exist.
    OutputMissing(String),
    /// All outputs exist but there are no inputs to compare them against.
    NoInputs,
    /// The oldest output is older than the newest input.
    Stale,
    UpToDate,
}

impl Decision {
    pub fn need_build(&self) -> bool {
        !matches!(self, Self::UpToDate)
    }

    /// Whether this is an acceptable state right after running the command.
    /// With no inputs there is nothing the outputs could be stale against.
    pub fn satisfied_after_build(&self) -> bool {
        matches!(self, Self::UpToDate | Self::NoInputs)
    }
}

/// Something that determines if a build step should run.
pub trait Decider: Send + Sync {
    fn decide(&self, inputs: &[String], outputs: &[String]) -> Result<Decision, Error>;

    /// True if the step should run.
    fn need_build(&self, inputs: &[String], outputs: &[String]) -> Result<bool, Error> {
        Ok(self.decide(inputs, outputs)?.need_build())
    }
}

/// Forces a build if any output is missing, there are no inputs, or any
/// input is newer than any output. This is the default decider.
///
/// Checks happen in exactly that order.
#[derive(Debug, Default, Clone)]
pub struct TimeDecider {
    /// relative file names are looked up here
    root: PathBuf,
}

impl TimeDecider {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }
}

impl Decider for TimeDecider {
    fn decide(&self, inputs: &[String], outputs: &[String]) -> Result<Decision, Error> {
        if outputs.is_empty() {
            return Err(Error::NothingToBuild);
        }

        let mut oldest_output: Option<SystemTime> = None;
        for file in outputs {
            match fs::modified(self.root.join(file)) {
                Ok(t) => oldest_output = Some(oldest_output.map_or(t, |o| o.min(t))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Ok(Decision::OutputMissing(file.clone()))
                }
                Err(e) => return Err(Error::Io(file.clone(), e)),
            }
        }

        if inputs.is_empty() {
            return Ok(Decision::NoInputs);
        }

        let mut newest_input: Option<SystemTime> = None;
        for file in inputs {
            match fs::modified(self.root.join(file)) {
                Ok(t) => newest_input = Some(newest_input.map_or(t, |n| n.max(t))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(Error::MissingInput(file.clone()))
                }
                Err(e) => return Err(Error::Io(file.clone(), e)),
            }
        }

        match (oldest_output, newest_input) {
            (Some(out), Some(input)) if out < input => Ok(Decision::Stale),
            _ => Ok(Decision::UpToDate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs::File;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::tempdir;

    fn touch(path: &Path, age: Duration) -> Result<String> {
        let file = File::create(path)?;
        file.set_modified(SystemTime::now() - age)?;
        Ok(path.to_str().expect("utf-8 temp path").to_owned())
    }

    #[test]
    fn test_no_outputs_is_an_error() {
        let d = TimeDecider::default();
        assert!(matches!(d.need_build(&[], &[]), Err(Error::NothingToBuild)));
        let inputs = vec!["/nothing/to/read".to_owned()];
        assert!(matches!(d.need_build(&inputs, &[]), Err(Error::NothingToBuild)));
    }

    #[test]
    fn test_missing_output_needs_build() -> Result<()> {
        let d = TimeDecider::default();
        let outputs = vec!["/nothing/to/read".to_owned()];
        assert_eq!(
            d.decide(&[], &outputs)?,
            Decision::OutputMissing("/nothing/to/read".to_owned())
        );

        // missing outputs are checked before inputs, so a missing input doesn't matter yet:
        let inputs = vec!["/also/not/here".to_owned()];
        assert!(d.need_build(&inputs, &outputs)?);
        Ok(())
    }

    #[test]
    fn test_no_inputs_needs_build() -> Result<()> {
        let dir = tempdir()?;
        let out = touch(&dir.path().join("out.txt"), Duration::ZERO)?;
        let d = TimeDecider::default();
        assert_eq!(d.decide(&[], &[out.clone()])?, Decision::NoInputs);
        assert!(d.need_build(&[], &[out])?);
        Ok(())
    }

    #[test]
    fn test_output_appears() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out.txt");
        let outputs = vec![path.to_str().expect("utf-8").to_owned()];
        let d = TimeDecider::default();

        let before = d.decide(&[], &outputs)?;
        assert!(matches!(before, Decision::OutputMissing(_)));
        assert!(!before.satisfied_after_build());

        touch(&path, Duration::ZERO)?;
        let after = d.decide(&[], &outputs)?;
        assert_eq!(after, Decision::NoInputs);
        assert!(after.satisfied_after_build());
        Ok(())
    }

    #[test]
    fn test_timestamps() -> Result<()> {
        let dir = tempdir()?;
        let old = touch(&dir.path().join("old"), Duration::from_secs(60))?;
        let new = touch(&dir.path().join("new"), Duration::ZERO)?;
        let d = TimeDecider::default();

        // input newer - must build
        assert_eq!(d.decide(&[new.clone()], &[old.clone()])?, Decision::Stale);
        // input older - must NOT build
        assert_eq!(d.decide(&[old.clone()], &[new.clone()])?, Decision::UpToDate);
        // same file on both sides isn't stale
        assert_eq!(d.decide(&[new.clone()], &[new.clone()])?, Decision::UpToDate);

        // the oldest output and the newest input are what count:
        let mid = touch(&dir.path().join("mid"), Duration::from_secs(30))?;
        assert_eq!(
            d.decide(&[old.clone(), mid.clone()], &[new.clone(), old.clone()])?,
            Decision::Stale
        );
        assert_eq!(d.decide(&[old.clone()], &[new, mid])?, Decision::UpToDate);
        Ok(())
    }

    #[test]
    fn test_repeatable() -> Result<()> {
        let dir = tempdir()?;
        let old = touch(&dir.path().join("old"), Duration::from_secs(60))?;
        let new = touch(&dir.path().join("new"), Duration::ZERO)?;
        let d = TimeDecider::default();
        for (inputs, outputs) in [(&new, &old), (&old, &new)] {
            let inputs = [inputs.clone()];
            let outputs = [outputs.clone()];
            assert_eq!(d.decide(&inputs, &outputs)?, d.decide(&inputs, &outputs)?);
        }
        Ok(())
    }

    #[test]
    fn test_relative_to_root() -> Result<()> {
        let dir = tempdir()?;
        touch(&dir.path().join("in"), Duration::from_secs(60))?;
        touch(&dir.path().join("out"), Duration::ZERO)?;
        let d = TimeDecider::new(dir.path());
        let (inputs, outputs) = (["in".to_owned()], ["out".to_owned()]);
        assert_eq!(d.decide(&inputs, &outputs)?, Decision::UpToDate);
        Ok(())
    }

    #[test]
    fn test_missing_input() -> Result<()> {
        let dir = tempdir()?;
        let out = touch(&dir.path().join("out"), Duration::ZERO)?;
        let inputs = vec![dir.path().join("gone").to_str().expect("utf-8").to_owned()];
        let err = TimeDecider::default().decide(&inputs, &[out]).unwrap_err();
        assert!(matches!(err, Error::MissingInput(_)));
        Ok(())
    }
}
