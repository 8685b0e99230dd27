//! File watcher for the `watch` task.
//!
//! Three subscriptions, each binding one glob to one task:
//!
//! | glob            | task     |
//! |-----------------|----------|
//! | `[paths.elm]`   | `elm`    |
//! | `[paths.static]`| `static` |
//! | `[paths.sass]`  | `css`    |
//!
//! Each filesystem event re-runs exactly the tasks whose glob matches one of
//! the event's paths, once per event. Events are handled as they arrive,
//! without debouncing. The loop ends only when the process does.

use crate::{
    config::PipelineConfig,
    log,
    task::{Runner, TaskName},
    utils::glob::GlobPattern,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    path::{Path, PathBuf},
    sync::mpsc,
};

/// One glob bound to the task it re-runs.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub glob: GlobPattern,
    pub task: TaskName,
}

/// Build the three subscriptions from config.
pub fn subscriptions(config: &PipelineConfig) -> Result<Vec<Subscription>> {
    Ok(vec![
        Subscription { glob: config.elm_glob()?, task: TaskName::Elm },
        Subscription { glob: config.static_glob()?, task: TaskName::Static },
        Subscription { glob: config.sass_glob()?, task: TaskName::Css },
    ])
}

/// Tasks bound to globs matching `rel_path`, in subscription order.
pub fn tasks_for_path(subscriptions: &[Subscription], rel_path: &Path) -> Vec<TaskName> {
    subscriptions
        .iter()
        .filter(|sub| sub.glob.matches(rel_path))
        .map(|sub| sub.task)
        .collect()
}

/// Directories to watch recursively: each glob base that exists, without
/// directories already covered by an ancestor.
fn watch_dirs(root: &Path, subscriptions: &[Subscription]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = subscriptions
        .iter()
        .map(|sub| root.join(sub.glob.base()))
        .filter(|dir| dir.is_dir())
        .collect();
    dirs.sort();
    dirs.dedup();

    let mut kept: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        if !kept.iter().any(|k| dir.starts_with(k)) {
            kept.push(dir);
        }
    }
    kept
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Tasks an event maps to, each paired with the first path that triggered it.
///
/// Paths under `dest` are ignored so tasks never react to their own output.
fn triggered_tasks<'a>(
    config: &PipelineConfig,
    subscriptions: &[Subscription],
    event: &'a Event,
) -> Vec<(TaskName, &'a Path)> {
    let root = config.get_root();

    let mut triggered: Vec<(TaskName, &Path)> = Vec::new();
    for path in &event.paths {
        if path.starts_with(config.dest()) {
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(path.as_path());
        for task in tasks_for_path(subscriptions, rel) {
            if !triggered.iter().any(|(t, _)| *t == task) {
                triggered.push((task, rel));
            }
        }
    }
    triggered
}

/// Re-run the tasks an event maps to. Task failures are logged.
fn handle_event(runner: &Runner, subscriptions: &[Subscription], event: &Event) {
    for (task, rel) in triggered_tasks(runner.config(), subscriptions, event) {
        log!("watch"; "{} changed, running {task}", rel.display());
        if let Err(e) = runner.rerun(task) {
            log!("error"; "{task}: {e:#}");
        }
    }
}

fn handle_result(runner: &Runner, subscriptions: &[Subscription], res: notify::Result<Event>) {
    match res {
        Ok(event) if is_relevant(&event) => handle_event(runner, subscriptions, &event),
        Ok(_) => {}
        Err(e) => log!("watch"; "error: {e}"),
    }
}

/// Watch every existing glob base recursively.
///
/// Events arrive on the returned channel for as long as the watcher lives.
fn start_watcher(
    root: &Path,
    subscriptions: &[Subscription],
) -> Result<(RecommendedWatcher, mpsc::Receiver<notify::Result<Event>>)> {
    let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;

    let dirs = watch_dirs(root, subscriptions);
    if dirs.is_empty() {
        log!("watch"; "nothing to watch under {}", root.display());
    }
    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
    }

    Ok((watcher, rx))
}

/// Run the watch loop on the current thread.
pub fn watch_blocking(runner: &Runner) -> Result<()> {
    let config = runner.config();
    let subscriptions = subscriptions(config)?;
    let (_watcher, rx) = start_watcher(config.get_root(), &subscriptions)?;

    for sub in &subscriptions {
        log!("watch"; "{} -> {}", sub.glob, sub.task);
    }

    for res in rx {
        handle_result(runner, &subscriptions, res);
    }

    Ok(())
}
