//! elm-pipe - build, serve and watch an Elm + Sass front-end.

mod cli;
mod compiler;
mod config;
mod serve;
mod task;
mod utils;
mod watch;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::PipelineConfig;
use task::{Runner, task_tree};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_tasks {
        print!("{}", task_tree());
        return Ok(());
    }

    let config: &'static PipelineConfig = Box::leak(Box::new(PipelineConfig::load(&cli)?));
    Runner::new(config).run_all(&cli.requested_tasks())
}
