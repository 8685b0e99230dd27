//! Sass compilation.
//!
//! Compile errors are reported under the `css` prefix and never fail the
//! task, so an unfinished stylesheet edit does not end a watch session.

use super::{TaskReport, ensure_parent, output_path};
use crate::{config::PipelineConfig, exec, log, utils::glob::GlobPattern};
use anyhow::Result;
use std::path::Path;

/// Compile the Sass entry file(s) matching `[paths.sass]` to CSS.
///
/// Partials (`_name.scss`) are only compiled through their importers.
pub fn compile_css(config: &PipelineConfig) -> Result<TaskReport> {
    let glob = config.sass_glob()?;
    let inputs: Vec<_> = glob
        .collect(config.get_root(), config.dest())
        .into_iter()
        .filter(|p| !is_partial(p))
        .collect();

    let mut report = TaskReport::default();
    if inputs.is_empty() {
        log!("css"; "no stylesheet matches `{glob}`");
        return Ok(report);
    }

    for rel_path in &inputs {
        match compile_file(rel_path, &glob, config) {
            Ok(()) => report.succeeded += 1,
            Err(e) => {
                report.failed += 1;
                log!("css"; "{}: {:#}", rel_path.display(), e);
            }
        }
    }

    if report.failed == 0 {
        log!("css"; "compiled {}", inputs.len());
    }
    Ok(report)
}

fn compile_file(rel_path: &Path, glob: &GlobPattern, config: &PipelineConfig) -> Result<()> {
    let css = &config.css;
    let output = output_path(config, glob, rel_path, Some("css"));
    ensure_parent(&output)?;

    exec!(
        config.get_root();
        &css.command;
        format!("--style={}", css.style.as_str()),
        if css.source_map { "" } else { "--no-source-map" },
        rel_path,
        &output
    )?;

    Ok(())
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}
