//! Elm compiler integration: one-time `elm-init` and per-file `elm make`.

use super::{TaskReport, ensure_parent, output_path};
use crate::{
    config::PipelineConfig,
    exec, exec_with_stdin, log,
    utils::{exec::FilterRule, glob::GlobPattern},
};
use anyhow::{Context, Result};
use std::{
    io::{ErrorKind, Write},
    path::Path,
};

/// Project manifest written by `elm init`
const MANIFEST: &str = "elm.json";

/// `elm make` reports progress on stderr even when it succeeds.
static ELM_FILTER: FilterRule = FilterRule::new(&["Compiling", "Success!", "Dependencies ready!"]);

/// One-time compiler setup.
///
/// Verifies the compiler is installed and creates `elm.json` through
/// `elm init` when the project has none, answering its confirmation prompt.
pub fn init_elm(config: &PipelineConfig) -> Result<()> {
    PipelineConfig::check_command_installed("[elm.command]", &config.elm.command)?;

    let root = config.get_root();
    if root.join(MANIFEST).is_file() {
        return Ok(());
    }

    log!("elm-init"; "no {MANIFEST} found, running `{} init`", config.elm.command.join(" "));
    let mut proc = exec_with_stdin!(root; &config.elm.command; "init")?;
    // The compiler may exit without reading the prompt answer
    if let Some(stdin) = proc.stdin()
        && let Err(e) = stdin.write_all(b"y\n")
        && e.kind() != ErrorKind::BrokenPipe
    {
        return Err(e).context("Failed to answer `elm init` prompt");
    }
    proc.wait()
}

/// Compile every source matching `[paths.elm]` into the output directory.
///
/// Files compile one after another: concurrent `elm make` runs share
/// `elm-stuff/` and corrupt its build artifacts.
pub fn compile_elm(config: &PipelineConfig) -> Result<TaskReport> {
    let glob = config.elm_glob()?;
    let sources = glob.collect(config.get_root(), config.dest());

    if sources.is_empty() {
        log!("elm"; "no files match `{glob}`");
        return Ok(TaskReport::default());
    }

    let mut report = TaskReport::default();
    for rel_path in &sources {
        report.absorb(rel_path, compile_file(rel_path, &glob, config));
    }

    report.log("elm", "compiled");
    Ok(report)
}

fn compile_file(rel_path: &Path, glob: &GlobPattern, config: &PipelineConfig) -> Result<()> {
    let elm = &config.elm;
    let output = output_path(config, glob, rel_path, Some(elm.output.extension()));
    ensure_parent(&output)?;

    exec!(
        filter=&ELM_FILTER;
        config.get_root();
        &elm.command;
        "make",
        rel_path,
        format!("--output={}", output.display()),
        if elm.debug { "--debug" } else { "" },
        if elm.optimize { "--optimize" } else { "" }
    )?;

    Ok(())
}
