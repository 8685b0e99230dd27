//! External command execution.
//!
//! The Elm and Sass compilers are external programs; every invocation goes
//! through here so failures carry the compiler's own diagnostics.

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    ffi::OsString,
    io::Read,
    path::Path,
    process::{Child, ChildStdin, Command, Output, Stdio},
    sync::OnceLock,
};

// ============================================================================
// Macros
// ============================================================================

/// Run an external command with arguments and capture its output.
///
/// # Examples
/// ```ignore
/// // Without working directory
/// exec!(["elm"]; "--version")?;
///
/// // With working directory
/// exec!(root; &config.elm.command; "make", input, output)?;
///
/// // With custom filter
/// static QUIET: FilterRule = FilterRule::new(&["Success!"]);
/// exec!(filter=&QUIET; root; ["elm"]; "make", input)?;
/// ```
#[macro_export]
macro_rules! exec {
    (filter=$filter:expr; $($rest:tt)*) => {
        $crate::exec_internal!(@parse_root $filter; $($rest)*)
    };
    ($($rest:tt)*) => {
        $crate::exec_internal!(@parse_root &$crate::utils::exec::EMPTY_FILTER; $($rest)*)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! exec_internal {
    (@parse_root $filter:expr; $root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            Some($root),
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
        )
    };
    (@parse_root $filter:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            None,
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            $filter,
        )
    };
}

/// Spawn an external command with piped stdin and return a `RunningProcess`.
///
/// Caller writes to `proc.stdin()` and must call `proc.wait()` to finish.
///
/// # Examples
/// ```ignore
/// let mut proc = exec_with_stdin!(root; &config.elm.command; "init")?;
/// if let Some(stdin) = proc.stdin() {
///     stdin.write_all(b"y\n")?;
/// }
/// proc.wait()?;
/// ```
#[macro_export]
macro_rules! exec_with_stdin {
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::spawn_with_stdin(
            Some($root),
            &$crate::utils::exec::internal::to_cmd_vec($cmd),
            &$crate::utils::exec::internal::filter_args(&[$($crate::utils::exec::internal::to_os($arg)),*]),
            &$crate::utils::exec::EMPTY_FILTER,
        )
    };
}

// ============================================================================
// Argument Conversion
// ============================================================================

#[doc(hidden)]
#[allow(clippy::wildcard_imports)] // Needed for macro internal module
pub mod internal {
    use super::*;

    #[inline]
    pub fn to_os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    pub trait ToCmd {
        fn to_cmd(self) -> Vec<OsString>;
    }

    impl<const N: usize> ToCmd for [&str; N] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.into_iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &[String] {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    impl ToCmd for &Vec<String> {
        #[inline]
        fn to_cmd(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    #[inline]
    pub fn to_cmd_vec<C: ToCmd>(cmd: C) -> Vec<OsString> {
        cmd.to_cmd()
    }

    /// Drop empty args so optional flags can be written as `if x { "--flag" } else { "" }`.
    #[inline]
    pub fn filter_args(args: &[OsString]) -> Vec<OsString> {
        args.iter().filter(|a| !a.is_empty()).cloned().collect()
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Execute a command and capture its output.
///
/// # Errors
/// Returns error if the command cannot be started or exits non-zero. The
/// error message carries the command's stderr (and stdout, if any).
pub fn exec(
    root: Option<&Path>,
    cmd: &[OsString],
    args: &[OsString],
    filter: &'static FilterRule,
) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    log_output(&name, &output, filter)?;
    Ok(output)
}

/// Spawn a command with piped stdin.
///
/// # Errors
/// Returns error if command fails to spawn.
pub fn spawn_with_stdin(
    root: Option<&Path>,
    cmd: &[OsString],
    args: &[OsString],
    filter: &'static FilterRule,
) -> Result<RunningProcess> {
    let (name, mut command) = prepare(root, cmd, args)?;

    command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child: Child = command
        .spawn()
        .with_context(|| format!("Failed to spawn `{name}`"))?;

    let stdin = child.stdin.take().context("Failed to acquire stdin")?;
    Ok(RunningProcess {
        child,
        stdin: Some(stdin),
        name,
        filter,
    })
}

/// A running child process with piped stdin.
///
/// Stdin is closed before waiting so the child sees EOF.
pub struct RunningProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    name: String,
    filter: &'static FilterRule,
}

impl RunningProcess {
    pub const fn stdin(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    /// Wait for the child process and check its exit status.
    ///
    /// # Errors
    /// Returns error if process exits with non-zero status.
    pub fn wait(mut self) -> Result<()> {
        // Must close stdin before wait, otherwise child blocks on read
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .with_context(|| format!("{} process failed", self.name))?;

        if !status.success() {
            let mut stderr_bytes = Vec::new();
            if let Some(mut stderr) = self.child.stderr.take() {
                let _ = stderr.read_to_end(&mut stderr_bytes);
            }

            let output = Output {
                status,
                stdout: Vec::new(),
                stderr: stderr_bytes,
            };

            anyhow::bail!(format_error(&self.name, &output, self.filter));
        }
        Ok(())
    }
}

fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let name = cmd
        .first()
        .and_then(|s| s.to_str())
        .context("Empty command")?
        .to_owned();

    let mut command = Command::new(&cmd[0]);
    command.args(&cmd[1..]).args(args);

    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

// ============================================================================
// Output Filtering
// ============================================================================

fn strip_ansi(s: &str) -> std::borrow::Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").unwrap());
    re.replace_all(s, "")
}

/// Prefix filter for command output lines.
///
/// Lines starting with any of `skip_prefixes` (after ANSI stripping) are not
/// logged.
pub struct FilterRule {
    pub skip_prefixes: &'static [&'static str],
}

impl FilterRule {
    pub const fn new(skip_prefixes: &'static [&'static str]) -> Self {
        Self { skip_prefixes }
    }

    fn should_skip(&self, output: &str) -> bool {
        output.is_empty() || self.skip_prefixes.iter().any(|p| output.starts_with(p))
    }

    fn log(&self, name: &str, output: &str) {
        let valid_lines: Vec<_> = output
            .lines()
            .filter(|line| !self.should_skip(strip_ansi(line).trim()))
            .collect();

        if !valid_lines.is_empty() {
            log!(name; "{}", valid_lines.join("\n"));
        }
    }
}

/// Stdout filter: skip generated HTML and JSON output.
const STDOUT_FILTER: FilterRule = FilterRule::new(&["<!DOCTYPE", "{"]);

/// Empty filter (no skipping).
pub const EMPTY_FILTER: FilterRule = FilterRule::new(&[]);

fn log_output(name: &str, output: &Output, filter: &'static FilterRule) -> Result<()> {
    if !output.status.success() {
        anyhow::bail!(format_error(name, output, filter));
    }

    // On success, only stderr (warnings) is worth showing
    let stderr = String::from_utf8_lossy(&output.stderr);
    filter.log(name, stderr.trim());

    Ok(())
}

fn format_error(name: &str, output: &Output, filter: &'static FilterRule) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);

    let error_msg = filter
        .skip_prefixes
        .iter()
        .fold(stderr.trim(), |s, p| s.trim_start_matches(p).trim_start());

    let mut msg = format!("Command `{name}` failed with {}\n", output.status);
    if !error_msg.is_empty() {
        msg.push_str(error_msg);
    }

    let stdout_trimmed = stdout.trim();
    if !stdout_trimmed.is_empty() && !STDOUT_FILTER.should_skip(stdout_trimmed) {
        msg.push_str("\nStdout:\n");
        msg.push_str(stdout_trimmed);
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::exec::internal::*;

    #[test]
    fn test_to_cmd_vec_from_config_vec() {
        let v = vec!["elm".to_string(), "--verbose".to_string()];
        let cmd = to_cmd_vec(&v);
        assert_eq!(cmd, vec![OsString::from("elm"), OsString::from("--verbose")]);
    }

    #[test]
    fn test_filter_args_drops_empty_flags() {
        let debug = false;
        let args = [
            to_os("make"),
            to_os(if debug { "--debug" } else { "" }),
            to_os("src/Main.elm"),
        ];
        let filtered = filter_args(&args);
        assert_eq!(filtered, vec![OsString::from("make"), OsString::from("src/Main.elm")]);
    }

    #[test]
    fn test_prepare_empty() {
        assert!(prepare(None, &[], &[]).is_err());
    }

    #[test]
    fn test_filter_rule() {
        let filter = FilterRule::new(&["Success!", "Compiling"]);
        assert!(filter.should_skip("Success! Compiled 1 module."));
        assert!(filter.should_skip("Compiling ..."));
        assert!(!filter.should_skip("-- TYPE MISMATCH --"));
        assert!(filter.should_skip(""));
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(strip_ansi("\x1b[1;32mGreen Bold\x1b[0m"), "Green Bold");
        assert_eq!(strip_ansi("Plain text"), "Plain text");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_failure_carries_stderr() {
        let err = exec!(["sh"]; "-c", "echo 'bad syntax' >&2; exit 3").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Command `sh` failed"));
        assert!(msg.contains("bad syntax"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_in_root() {
        let dir = tempfile::tempdir().unwrap();
        let output = exec!(dir.path(); ["sh"]; "-c", "pwd").unwrap();
        let pwd = String::from_utf8_lossy(&output.stdout);
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(pwd.trim()).canonicalize().unwrap(), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_with_stdin_feeds_child() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut proc = exec_with_stdin!(dir.path(); ["sh"]; "-c", "read answer; echo \"$answer\" > answer.txt").unwrap();
        proc.stdin().unwrap().write_all(b"y\n").unwrap();
        proc.wait().unwrap();

        let answer = std::fs::read_to_string(dir.path().join("answer.txt")).unwrap();
        assert_eq!(answer.trim(), "y");
    }
}
