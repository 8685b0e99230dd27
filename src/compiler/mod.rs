//! Per-file build tasks.
//!
//! - **elm**: `elm-init` setup and `elm make` for every Elm source
//! - **css**: Sass entry file to CSS
//! - **assets**: verbatim copy of static files
//!
//! Every task absorbs per-file failures: the error is logged, the file is
//! skipped, and the task itself still succeeds so a watch session survives a
//! bad edit. Only setup problems (invalid glob, missing compiler at init)
//! propagate as errors.

pub mod assets;
pub mod css;
pub mod elm;

use crate::{config::PipelineConfig, log, utils::glob::GlobPattern};
use anyhow::Result;
use std::{
    fs,
    path::{Path, PathBuf},
};

pub use assets::copy_static;
pub use css::compile_css;
pub use elm::{compile_elm, init_elm};

/// Outcome of one task run over its matched files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl TaskReport {
    /// Record a per-file result, logging the error if there is one.
    fn absorb(&mut self, rel_path: &Path, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                self.failed += 1;
                log!("error"; "{}: {:#}", rel_path.display(), e);
            }
        }
    }

    fn log(&self, module: &str, verb: &str) {
        match self.failed {
            0 => log!(module; "{verb} {} files", self.succeeded),
            n => log!(module; "{verb} {} files, {n} failed", self.succeeded),
        }
    }
}

/// Destination for a matched source: mirrored under `dest` relative to the
/// glob base, with the extension swapped when `extension` is given.
pub fn output_path(
    config: &PipelineConfig,
    glob: &GlobPattern,
    rel_path: &Path,
    extension: Option<&str>,
) -> PathBuf {
    let output = config.dest().join(glob.strip_base(rel_path));
    match extension {
        Some(ext) => output.with_extension(ext),
        None => output,
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Default config rooted at `root`, with paths resolved.
#[cfg(test)]
pub(crate) fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.root = root.to_path_buf();
    config.resolve_root();
    config
}

/// Write `content` to `root/rel`, creating parent directories.
#[cfg(test)]
pub(crate) fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    ensure_parent(&path).unwrap();
    fs::write(path, content).unwrap();
}
