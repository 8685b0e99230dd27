//! Glob patterns for source discovery and watch matching.
//!
//! Patterns are written relative to the project root, e.g. `src/**/*.elm`.
//! Each pattern has a *base*: the leading path components that contain no
//! wildcard. Outputs are mirrored relative to that base, so `src/Page/Home.elm`
//! lands at `dist/Page/Home.js`.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// A compiled glob pattern with its non-wildcard base directory.
#[derive(Clone)]
pub struct GlobPattern {
    source: String,
    base: PathBuf,
    matcher: GlobMatcher,
}

impl fmt::Debug for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobPattern")
            .field("source", &self.source)
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl GlobPattern {
    /// Compile a pattern. `*` does not cross `/`; `**` does.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.replace('\\', "/");
        let matcher = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pattern}"))?
            .compile_matcher();

        Ok(Self {
            base: glob_base(&pattern),
            source: pattern,
            matcher,
        })
    }

    /// Directory (relative to root) that contains every possible match.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Match a path given relative to the project root.
    pub fn matches(&self, rel_path: &Path) -> bool {
        let rel = rel_path.to_string_lossy().replace('\\', "/");
        self.matcher.is_match(rel.trim_start_matches("./"))
    }

    /// Path of a match relative to the pattern base, used to place outputs.
    pub fn strip_base<'a>(&self, rel_path: &'a Path) -> &'a Path {
        rel_path.strip_prefix(&self.base).unwrap_or(rel_path)
    }

    /// Collect all files under `root` matching this pattern.
    ///
    /// Returned paths are relative to `root` and sorted. A missing base
    /// directory yields no matches. Nothing under `exclude` is visited, so a
    /// root-level pattern never picks up previous output.
    pub fn collect(&self, root: &Path, exclude: &Path) -> Vec<PathBuf> {
        let start = root.join(&self.base);
        let mut files: Vec<PathBuf> = WalkDir::new(&start)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| !entry.path().starts_with(exclude))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .filter(|rel| self.matches(rel))
            .collect();
        files.sort();
        files
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Leading path components without wildcards.
///
/// `src/**/*.elm` → `src`, `src/scss/index.scss` → `src/scss`, `*.html` → ``.
fn glob_base(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let literal = !pattern.contains(GLOB_META);

    let mut base = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) if part.to_string_lossy().contains(GLOB_META) => break,
            Component::CurDir => {}
            other => base.push(other),
        }
    }

    if literal {
        base.pop();
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/**/*.elm"), PathBuf::from("src"));
        assert_eq!(glob_base("src/scss/index.scss"), PathBuf::from("src/scss"));
        assert_eq!(glob_base("./src/*.html"), PathBuf::from("src"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("index.scss"), PathBuf::new());
    }

    #[test]
    fn test_matches_recursive() {
        let glob = GlobPattern::new("src/**/*.elm").unwrap();
        assert!(glob.matches(Path::new("src/Main.elm")));
        assert!(glob.matches(Path::new("src/Page/Home.elm")));
        assert!(glob.matches(Path::new("./src/Main.elm")));
        assert!(!glob.matches(Path::new("src/index.html")));
        assert!(!glob.matches(Path::new("lib/Main.elm")));
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let glob = GlobPattern::new("src/*.html").unwrap();
        assert!(glob.matches(Path::new("src/index.html")));
        assert!(!glob.matches(Path::new("src/pages/about.html")));
    }

    #[test]
    fn test_literal_pattern() {
        let glob = GlobPattern::new("src/scss/index.scss").unwrap();
        assert!(glob.matches(Path::new("src/scss/index.scss")));
        assert!(!glob.matches(Path::new("src/scss/_vars.scss")));
        assert_eq!(glob.base(), Path::new("src/scss"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(GlobPattern::new("src/[*.elm").is_err());
    }

    #[test]
    fn test_strip_base() {
        let glob = GlobPattern::new("src/**/*.html").unwrap();
        assert_eq!(glob.strip_base(Path::new("src/pages/a.html")), Path::new("pages/a.html"));
    }

    #[test]
    fn test_collect_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/Page")).unwrap();
        fs::write(root.join("src/Main.elm"), "").unwrap();
        fs::write(root.join("src/Page/Home.elm"), "").unwrap();
        fs::write(root.join("src/index.html"), "").unwrap();

        let glob = GlobPattern::new("src/**/*.elm").unwrap();
        let files = glob.collect(root, &root.join("dist"));
        assert_eq!(
            files,
            vec![PathBuf::from("src/Main.elm"), PathBuf::from("src/Page/Home.elm")]
        );
    }

    #[test]
    fn test_collect_missing_base() {
        let dir = tempdir().unwrap();
        let glob = GlobPattern::new("src/**/*.elm").unwrap();
        assert!(glob.collect(dir.path(), &dir.path().join("dist")).is_empty());
    }

    #[test]
    fn test_collect_skips_excluded_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("dist/nested")).unwrap();
        fs::write(root.join("index.html"), "").unwrap();
        fs::write(root.join("dist/index.html"), "").unwrap();
        fs::write(root.join("dist/nested/page.html"), "").unwrap();

        let glob = GlobPattern::new("**/*.html").unwrap();
        assert_eq!(glob.collect(root, &root.join("dist")), vec![PathBuf::from("index.html")]);
    }
}
