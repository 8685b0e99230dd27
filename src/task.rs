//! Task graph and runner.
//!
//! The graph is fixed:
//!
//! ```text
//! default ──► connect            (server thread, returns immediately)
//!         ├─► build ──► elm ──► elm-init
//!         │         ├─► static
//!         │         └─► css
//!         └─► watch              (blocks; re-runs elm / static / css)
//! ```
//!
//! Within one invocation a task reached through several paths runs once.
//! Watch-triggered re-runs force the triggered task but still skip
//! dependencies that already ran, so `elm-init` happens once per process.

use crate::{
    compiler::{compile_css, compile_elm, copy_static, init_elm},
    config::PipelineConfig,
    log,
    serve::{ServerHandle, start_server},
    watch::watch_blocking,
};
use anyhow::Result;
use clap::ValueEnum;
use rustc_hash::FxHashSet;
use std::{fmt, sync::Mutex};

/// Every task the runner knows, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum TaskName {
    /// One-time Elm compiler setup
    ElmInit,
    /// Compile the Sass entry file to CSS
    Css,
    /// Compile Elm sources
    Elm,
    /// Copy static HTML files
    Static,
    /// Re-run elm / static / css when their sources change
    Watch,
    /// Serve the output directory over HTTP
    Connect,
    /// elm + static + css
    Build,
    /// connect, then build, then watch
    Default,
}

impl TaskName {
    pub const ALL: [Self; 8] = [
        Self::ElmInit,
        Self::Css,
        Self::Elm,
        Self::Static,
        Self::Watch,
        Self::Connect,
        Self::Build,
        Self::Default,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElmInit => "elm-init",
            Self::Css => "css",
            Self::Elm => "elm",
            Self::Static => "static",
            Self::Watch => "watch",
            Self::Connect => "connect",
            Self::Build => "build",
            Self::Default => "default",
        }
    }

    /// Tasks that must run before this one.
    pub const fn dependencies(self) -> &'static [TaskName] {
        match self {
            Self::Elm => &[Self::ElmInit],
            Self::Build => &[Self::Elm, Self::Static, Self::Css],
            Self::Default => &[Self::Connect, Self::Build, Self::Watch],
            _ => &[],
        }
    }

    /// Aggregates have no behaviour of their own.
    pub const fn is_aggregate(self) -> bool {
        matches!(self, Self::Build | Self::Default)
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render the task tree the way `--tasks` prints it.
pub fn task_tree() -> String {
    let mut out = String::new();
    for task in TaskName::ALL {
        out.push_str(task.as_str());
        if task.is_aggregate() {
            out.push_str(" (aggregate)");
        }
        out.push('\n');
        let deps = task.dependencies();
        for (i, dep) in deps.iter().enumerate() {
            let branch = if i + 1 == deps.len() { "└─" } else { "├─" };
            out.push_str(&format!("  {branch} {dep}\n"));
        }
    }
    out
}

/// Executes tasks against one configuration.
pub struct Runner {
    config: &'static PipelineConfig,
    done: Mutex<FxHashSet<TaskName>>,
    server: Mutex<Option<ServerHandle>>,
}

impl Runner {
    pub fn new(config: &'static PipelineConfig) -> Self {
        Self {
            config,
            done: Mutex::new(FxHashSet::default()),
            server: Mutex::new(None),
        }
    }

    pub const fn config(&self) -> &'static PipelineConfig {
        self.config
    }

    /// Run the requested top-level tasks in order.
    ///
    /// If a server was started and nothing else blocks, keeps serving in the
    /// foreground until the process is terminated.
    pub fn run_all(&self, tasks: &[TaskName]) -> Result<()> {
        for &task in tasks {
            self.run(task)?;
        }

        let server = self.server.lock().map_err(|_| anyhow::anyhow!("server lock poisoned"))?.take();
        if let Some(server) = server {
            server.join();
        }
        Ok(())
    }

    /// Run a task and its dependencies, each at most once per runner.
    ///
    /// A task that fails is not recorded as done, so a later run retries it.
    pub fn run(&self, task: TaskName) -> Result<()> {
        if !self.mark_done(task) {
            return Ok(());
        }
        self.execute(task)
    }

    /// Re-run a task after a file change.
    ///
    /// Unlike [`Runner::run`] the task itself always runs; dependencies that
    /// already completed are skipped.
    pub fn rerun(&self, task: TaskName) -> Result<()> {
        self.mark_done(task);
        self.execute(task)
    }

    fn execute(&self, task: TaskName) -> Result<()> {
        let result = self
            .run_dependencies(task)
            .and_then(|()| self.run_body(task));
        if result.is_err() {
            self.unmark_done(task);
        }
        result
    }

    /// Returns false if the task already ran or is running.
    fn mark_done(&self, task: TaskName) -> bool {
        self.done
            .lock()
            .map(|mut done| done.insert(task))
            .unwrap_or(false)
    }

    fn unmark_done(&self, task: TaskName) {
        if let Ok(mut done) = self.done.lock() {
            done.remove(&task);
        }
    }

    fn run_dependencies(&self, task: TaskName) -> Result<()> {
        match task {
            // Members share no inputs or outputs
            TaskName::Build => {
                let (elm, (stat, css)) = rayon::join(
                    || self.run(TaskName::Elm),
                    || rayon::join(|| self.run(TaskName::Static), || self.run(TaskName::Css)),
                );
                elm.and(stat).and(css)
            }
            _ => task.dependencies().iter().try_for_each(|&dep| self.run(dep)),
        }
    }

    fn run_body(&self, task: TaskName) -> Result<()> {
        let config = self.config;
        match task {
            TaskName::ElmInit => init_elm(config),
            TaskName::Css => compile_css(config).map(|_| ()),
            TaskName::Elm => compile_elm(config).map(|_| ()),
            TaskName::Static => copy_static(config).map(|_| ()),
            TaskName::Watch => watch_blocking(self),
            TaskName::Connect => {
                let handle = start_server(config)?;
                if let Ok(mut server) = self.server.lock() {
                    *server = Some(handle);
                }
                Ok(())
            }
            TaskName::Build => {
                log!("build"; "done");
                Ok(())
            }
            TaskName::Default => Ok(()),
        }
    }
}
