//! Command-line interface definitions.

use crate::task::TaskName;
use clap::Parser;
use std::path::PathBuf;

/// Build, serve and watch an Elm + Sass front-end
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Tasks to run in order; runs `default` when omitted
    #[arg(value_enum)]
    pub tasks: Vec<TaskName>,

    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Config file name, relative to root
    #[arg(short = 'C', long, default_value = "elm-pipe.toml")]
    pub config: PathBuf,

    /// Output directory path (relative to project root)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Interface for the dev server to bind on
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Port for the dev server
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Print the task tree and exit
    #[arg(long = "tasks")]
    pub list_tasks: bool,
}

impl Cli {
    /// Requested tasks, with `default` standing in for an empty list.
    pub fn requested_tasks(&self) -> Vec<TaskName> {
        if self.tasks.is_empty() {
            vec![TaskName::Default]
        } else {
            self.tasks.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_task_runs_default() {
        let cli = Cli::parse_from(["elm-pipe"]);
        assert_eq!(cli.requested_tasks(), vec![TaskName::Default]);
    }

    #[test]
    fn test_task_names_are_kebab_case() {
        let cli = Cli::parse_from(["elm-pipe", "elm-init", "css", "static", "connect"]);
        assert_eq!(
            cli.requested_tasks(),
            vec![TaskName::ElmInit, TaskName::Css, TaskName::Static, TaskName::Connect]
        );
    }

    #[test]
    fn test_unknown_task_rejected() {
        assert!(Cli::try_parse_from(["elm-pipe", "deploy"]).is_err());
    }

    #[test]
    fn test_options() {
        let cli = Cli::parse_from([
            "elm-pipe", "-r", "site", "-C", "pipe.toml", "-o", "public", "-p", "8000", "build",
        ]);
        assert_eq!(cli.root, Some(PathBuf::from("site")));
        assert_eq!(cli.config, PathBuf::from("pipe.toml"));
        assert_eq!(cli.output, Some(PathBuf::from("public")));
        assert_eq!(cli.port, Some(8000));
        assert_eq!(cli.requested_tasks(), vec![TaskName::Build]);
    }

    #[test]
    fn test_list_tasks_flag() {
        let cli = Cli::parse_from(["elm-pipe", "--tasks"]);
        assert!(cli.list_tasks);
        assert!(cli.tasks.is_empty());
    }
}
