use std::path::Path;

use colored::Colorize;

use pipeline::Step;
use util::UniqueStrings;

use crate::fs::{self, Removed};
use crate::ui::Ui;

/// Logic for removing the files steps produce.
pub struct Cleaner<'a> {
    /// relative file names are resolved here
    dir: &'a Path,
    ui: &'a Ui,
}

impl<'a> Cleaner<'a> {
    /// Create a new `Cleaner`.
    pub fn new(dir: &'a Path, ui: &'a Ui) -> Self {
        Self { dir, ui }
    }
}

impl Cleaner<'_> {
    /// Remove every output and clean file of `steps`.
    /// Keeps going after errors; returns how many files could not be removed.
    pub fn clean(&self, steps: &[Step]) -> usize {
        let files: UniqueStrings = steps
            .iter()
            .flat_map(|step| step.outputs.iter().chain(&step.clean))
            .cloned()
            .collect();
        self.ui.verbose_msg(&format!("Cleaning {} files", files.len()));
        self.remove_all(files.iter(), "CLEAN")
    }

    /// Remove the declared outputs of one failed step.
    pub fn delete_outputs(&self, step: &Step) -> usize {
        self.remove_all(step.outputs.iter().map(String::as_str), "DELETE")
    }

    fn remove_all<'s>(&self, files: impl Iterator<Item = &'s str>, verb: &str) -> usize {
        let mut errors = 0;
        for file in files {
            match fs::remove(&self.dir.join(file)) {
                Ok(Removed::Missing) => log::debug!("{file} already gone"),
                Ok(_) => eprintln!("{}: {}", verb.magenta(), file),
                Err(e) => {
                    eprintln!("{} {}: {:#}", "Failed to remove".red(), file, e);
                    errors += 1;
                }
            }
        }
        errors
    }
}
