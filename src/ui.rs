use colored::Colorize;

use util::Timer;

use crate::exec::{Level, Reporter};
use crate::settings::Settings;

/// All interactions with the text UI should go through this struct.
#[derive(Debug, Clone)]
pub struct Ui {
    /// -v setting, displays extra text info to user
    pub verbose: bool,
    /// keeps track of time for each task
    timer: Timer,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose > 0,
            timer: Timer::now(),
        }
    }

    pub fn start_timer(&mut self) {
        if self.verbose {
            self.timer.reset();
        }
    }

    pub fn print_elapsed(&self, task: &str) {
        if self.verbose {
            eprintln!("{}", self.timer.describe_elapsed(task));
        }
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{}", msg);
        }
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }
}

impl Reporter for Ui {
    fn record(&self, level: Level, line: &str) {
        match level {
            Level::Verbose => self.verbose_msg(line),
            Level::Info => eprintln!("{}", line),
            Level::Success => eprintln!("{}", line.green()),
            Level::Failure => eprintln!("{}", line.red()),
        }
    }
}
