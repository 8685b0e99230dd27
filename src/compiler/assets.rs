use super::{TaskReport, ensure_parent, output_path};
use crate::{config::PipelineConfig, log};
use anyhow::Result;
use std::{fs, path::Path};

/// Copy every file matching `[paths.static]` into the output directory.
pub fn copy_static(config: &PipelineConfig) -> Result<TaskReport> {
    let glob = config.static_glob()?;
    let root = config.get_root();
    let files = glob.collect(root, config.dest());

    if files.is_empty() {
        log!("static"; "no files match `{glob}`");
        return Ok(TaskReport::default());
    }

    let mut report = TaskReport::default();
    for rel_path in &files {
        let dest = output_path(config, &glob, rel_path, None);
        report.absorb(rel_path, copy_file(&root.join(rel_path), &dest));
    }

    report.log("static", "copied");
    Ok(report)
}

fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    ensure_parent(dest)?;
    fs::copy(source, dest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{test_config, write_file};
    use tempfile::tempdir;

    #[test]
    fn test_copies_html_unchanged() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_file(root, "src/index.html", "<!DOCTYPE html><title>home</title>");
        write_file(root, "src/pages/about.html", "<p>über</p>");
        write_file(root, "src/Main.elm", "module Main exposing (main)");

        let config = test_config(root);
        let report = copy_static(&config).unwrap();

        assert_eq!(report, TaskReport { succeeded: 2, failed: 0 });
        assert_eq!(
            fs::read(config.dest().join("index.html")).unwrap(),
            fs::read(root.join("src/index.html")).unwrap()
        );
        assert_eq!(
            fs::read_to_string(config.dest().join("pages/about.html")).unwrap(),
            "<p>über</p>"
        );
        assert!(!config.dest().join("Main.elm").exists());
    }

    #[test]
    fn test_overwrites_previous_output() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_file(root, "src/index.html", "new");
        write_file(root, "dist/index.html", "old");

        let config = test_config(root);
        copy_static(&config).unwrap();
        assert_eq!(fs::read_to_string(config.dest().join("index.html")).unwrap(), "new");
    }

    #[test]
    fn test_root_glob_does_not_copy_output_into_itself() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_file(root, "index.html", "home");

        let mut config = test_config(root);
        config.paths.r#static = "**/*.html".into();

        for _ in 0..3 {
            let report = copy_static(&config).unwrap();
            assert_eq!(report, TaskReport { succeeded: 1, failed: 0 });
        }
        assert_eq!(fs::read_to_string(config.dest().join("index.html")).unwrap(), "home");
        assert!(!config.dest().join("dist").exists());
    }

    #[test]
    fn test_copy_error_is_absorbed() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write_file(root, "src/index.html", "ok");
        write_file(root, "src/blocked/page.html", "blocked");
        // A file where the output directory needs to be
        write_file(root, "dist/blocked", "not a directory");

        let config = test_config(root);
        let report = copy_static(&config).unwrap();
        assert_eq!(report, TaskReport { succeeded: 1, failed: 1 });
        assert!(config.dest().join("index.html").is_file());
    }
}
