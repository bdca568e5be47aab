//! Shell script execution for external Xcode tooling.
//!
//! Commands are rendered as `sh -c` scripts from individually quoted words,
//! so user-supplied paths and names can never break out of their argument.
//! Output is captured concurrently from stdout and stderr into bounded
//! buffers that keep only the most recent bytes, and every run has a
//! wall-clock timeout. Children are killed when their future is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// Default timeout for short auxiliary commands (listing, install, launch).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Bytes of output quoted in error messages.
const ERROR_DETAIL_BYTES: usize = 2048;

const READ_CHUNK: usize = 8 * 1024;

/// Quotes one word for POSIX `sh`.
///
/// Words made only of characters that are never special to the shell are
/// returned unchanged; everything else is wrapped in single quotes.
#[must_use]
pub fn quote(word: &str) -> String {
    let is_plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-+=@%:,./".contains(c));

    if is_plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// A shell command assembled from quoted words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    program: String,
    words: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl Script {
    /// Starts a script invoking `program`.
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            words: vec![quote(program)],
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.words.push(quote(arg.as_ref()));
        self
    }

    /// Appends a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        let text = path.to_string_lossy().into_owned();
        self.arg(text)
    }

    /// Appends `flag value` when `value` is present.
    #[must_use]
    pub fn opt(self, flag: &str, value: Option<impl AsRef<str>>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    /// Runs the script from `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Returns the program name used in error messages.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Renders the script text passed to `sh -c`.
    #[must_use]
    pub fn render(&self) -> String {
        self.words.join(" ")
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(dir) = &self.current_dir {
            write!(f, "(cd {} && {})", quote(&dir.to_string_lossy()), self.render())
        } else {
            f.write_str(&self.render())
        }
    }
}

/// Output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    /// Captured stdout (tail only when truncated).
    pub stdout: String,
    /// Captured stderr (tail only when truncated).
    pub stderr: String,
    /// Whether stdout exceeded the capture limit.
    pub stdout_truncated: bool,
    /// Whether stderr exceeded the capture limit.
    pub stderr_truncated: bool,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Returns `true` if the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.status, Some(0))
    }

    /// Returns stdout, or a `CommandFailed` error for a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::CommandFailed` if the command did not succeed.
    pub fn into_stdout(self, program: &str) -> ToolResult<String> {
        if self.success() {
            return Ok(self.stdout);
        }

        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        Err(ToolError::CommandFailed {
            program: program.to_string(),
            status: self.status.unwrap_or(-1),
            detail: tail(source.trim(), ERROR_DETAIL_BYTES),
        })
    }
}

/// Returns at most the last `max_bytes` of `text`.
///
/// A shortened result starts at a line boundary when one is available and is
/// prefixed with a marker noting how much was dropped.
#[must_use]
pub fn tail(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }

    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    if let Some(newline) = text[start..].find('\n') {
        if newline + 1 < text.len() - start {
            start += newline + 1;
        }
    }

    format!("[... {start} bytes truncated ...]\n{}", &text[start..])
}

/// Runs scripts with a timeout and bounded output capture.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
    max_output_bytes: usize,
}

impl CommandRunner {
    /// Creates a runner.
    ///
    /// `timeout` applies to [`Self::run`]; `max_output_bytes` bounds each
    /// captured stream.
    #[must_use]
    pub const fn new(timeout: Duration, max_output_bytes: usize) -> Self {
        Self {
            timeout,
            max_output_bytes,
        }
    }

    /// Returns the default timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs a script with the runner's default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the shell cannot be started, I/O fails, or the
    /// timeout expires. A non-zero exit is not an error here.
    pub async fn run(&self, script: &Script) -> ToolResult<CommandOutput> {
        self.run_with_timeout(script, self.timeout).await
    }

    /// Runs a script with an explicit timeout.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_with_timeout(
        &self,
        script: &Script,
        timeout: Duration,
    ) -> ToolResult<CommandOutput> {
        let started = Instant::now();
        debug!(command = %script, timeout_secs = timeout.as_secs(), "Running command");

        let mut command = Command::new("/bin/sh");
        command
            .arg("-c")
            .arg(script.render())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &script.current_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            program: script.program().to_string(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.max_output_bytes;

        let work = async {
            let (out, err, status) = tokio::join!(
                capture(stdout, limit),
                capture(stderr, limit),
                child.wait()
            );
            Ok::<_, io::Error>((out?, err?, status?))
        };
        let outcome = tokio::time::timeout(timeout, work).await;

        match outcome {
            Ok(Ok((out, err, status))) => {
                let output = CommandOutput {
                    status: status.code(),
                    stdout: out.text(),
                    stderr: err.text(),
                    stdout_truncated: out.truncated,
                    stderr_truncated: err.truncated,
                    elapsed: started.elapsed(),
                };
                debug!(
                    command = script.program(),
                    status = ?output.status,
                    elapsed_ms = u64::try_from(output.elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Command finished"
                );
                Ok(output)
            }
            Ok(Err(e)) => Err(ToolError::Io(e)),
            Err(_) => {
                warn!(command = script.program(), timeout_secs = timeout.as_secs(), "Command timed out");
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to kill timed out command");
                }
                Err(ToolError::Timeout {
                    program: script.program().to_string(),
                    timeout,
                })
            }
        }
    }

    /// Runs a script and returns its stdout, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// See [`Self::run`] and [`CommandOutput::into_stdout`].
    pub async fn stdout(&self, script: &Script, timeout: Duration) -> ToolResult<String> {
        self.run_with_timeout(script, timeout)
            .await?
            .into_stdout(script.program())
    }
}

/// Bytes kept from one output stream.
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Reads a stream to its end, keeping only the last `limit` bytes.
async fn capture<R: AsyncRead + Unpin>(stream: Option<R>, limit: usize) -> io::Result<Captured> {
    let mut captured = Captured {
        bytes: Vec::new(),
        truncated: false,
    };
    let Some(mut stream) = stream else {
        return Ok(captured);
    };

    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.bytes.extend_from_slice(&chunk[..n]);

        // Compact lazily so each byte is moved a bounded number of times
        if captured.bytes.len() > limit.saturating_mul(2).max(READ_CHUNK) {
            let excess = captured.bytes.len() - limit;
            captured.bytes.drain(..excess);
            captured.truncated = true;
        }
    }

    if captured.bytes.len() > limit {
        let excess = captured.bytes.len() - limit;
        captured.bytes.drain(..excess);
        captured.truncated = true;
    }
    Ok(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> CommandRunner {
        CommandRunner::new(Duration::from_secs(10), 64 * 1024)
    }

    #[test]
    fn quote_leaves_plain_words_alone() {
        assert_eq!(quote("xcodebuild"), "xcodebuild");
        assert_eq!(quote("-scheme"), "-scheme");
        assert_eq!(quote("id=ABCD-1234"), "id=ABCD-1234");
        assert_eq!(quote("/Users/dev/App.xcworkspace"), "/Users/dev/App.xcworkspace");
    }

    #[test]
    fn quote_wraps_special_words() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("My App"), "'My App'");
        assert_eq!(quote("it's"), r"'it'\''s'");
        assert_eq!(quote("$(rm -rf ~)"), "'$(rm -rf ~)'");
        assert_eq!(quote("a;b"), "'a;b'");
    }

    #[test]
    fn script_renders_quoted_words() {
        let script = Script::new("xcodebuild")
            .arg("-scheme")
            .arg("My App")
            .opt("-configuration", Some("Debug"))
            .opt("-destination", None::<&str>)
            .path_arg(Path::new("/tmp/a b"));
        assert_eq!(script.render(), "xcodebuild -scheme 'My App' -configuration Debug '/tmp/a b'");
        assert_eq!(script.program(), "xcodebuild");
    }

    #[test]
    fn tail_keeps_short_text() {
        assert_eq!(tail("short", 100), "short");
    }

    #[test]
    fn tail_cuts_at_line_boundary() {
        let text = "line one\nline two\nline three\n";
        let result = tail(text, 15);
        assert!(result.starts_with("[... "));
        assert!(result.ends_with("line three\n"));
        assert!(!result.contains("line one"));
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ééééé";
        let result = tail(text, 3);
        assert!(result.ends_with('é'));
    }

    #[tokio::test]
    async fn runs_command_and_captures_output() {
        let output = runner().run(&Script::new("echo").arg("hello")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
        assert!(!output.stdout_truncated);
    }

    #[tokio::test]
    async fn quoted_arguments_reach_the_program_verbatim() {
        let hostile = "it's $HOME `whoami` ; echo pwned";
        let output = runner()
            .run(&Script::new("printf").arg("%s").arg(hostile))
            .await
            .unwrap();
        assert_eq!(output.stdout, hostile);
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let script = Script::new("sh").arg("-c").arg("echo oops >&2; exit 3");
        let output = runner().run(&script).await.unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stderr.trim(), "oops");

        let err = output.into_stdout("sh").unwrap_err();
        match err {
            ToolError::CommandFailed { status, detail, .. } => {
                assert_eq!(status, 3);
                assert_eq!(detail, "oops");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out_long_running_commands() {
        let runner = runner();
        let err = runner
            .run_with_timeout(&Script::new("sleep").arg("5"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
        assert!(err.to_string().contains("sleep"));
    }

    #[tokio::test]
    async fn bounds_captured_output() {
        let runner = CommandRunner::new(Duration::from_secs(10), 1000);
        let script = Script::new("sh")
            .arg("-c")
            .arg("i=0; while [ $i -lt 5000 ]; do echo line$i; i=$((i+1)); done");
        let output = runner.run(&script).await.unwrap();
        assert!(output.success());
        assert!(output.stdout_truncated);
        assert!(output.stdout.len() <= 1000);
        assert!(output.stdout.ends_with("line4999\n"));
    }

    #[tokio::test]
    async fn runs_in_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        let output = runner()
            .run(&Script::new("pwd").current_dir(&canonical))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), canonical.to_string_lossy());
    }

    #[tokio::test]
    async fn missing_directory_is_a_spawn_error() {
        let err = runner()
            .run(&Script::new("true").current_dir("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }
}
