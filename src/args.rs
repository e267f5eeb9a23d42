use clap::Parser;

const CMD_NAME: &str = "dmk";

/// Stores our command-line args format.
#[derive(Parser, Debug, Default)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// Pipeline file (default: first of Pipeline, pipeline, Pipeline.yaml, ... in this dir)
    #[arg(short = 'f', long = "pipeline", value_name = "FILE")]
    pub pipeline: Option<String>,

    /// Remove outputs and clean files instead of building
    #[arg(short, long)]
    pub clean: bool,

    /// List the selected steps and exit
    #[arg(short, long)]
    pub list: bool,

    /// Print additional info; repeat for debug logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Never delete outputs of failed steps
    #[arg(short = 'D', long)]
    pub no_delete_on_fail: bool,

    /// Steps to run, along with the steps they depend on
    #[arg(value_name = "STEP")]
    pub steps: Vec<String>,
}
