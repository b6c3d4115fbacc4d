//! Bounded subprocess invocation
//!
//! Every external program (compiler, build tool, benchmark binary) is run
//! through [`run`]. Output is captured on helper threads so a chatty child
//! cannot deadlock on a full pipe, stdin is always `/dev/null`, and an
//! optional wall-clock limit kills the child when exceeded.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::Result;

/// Description of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Create a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set one environment variable on top of the inherited environment.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables.
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Kill the child if it runs longer than `limit`. `None` waits forever.
    #[must_use]
    pub const fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit;
        self
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument list.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if set.
    #[must_use]
    pub fn get_cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Extra environment variables.
    #[must_use]
    pub const fn get_env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own process group, so a timeout also takes down grandchildren
            // (`sh -c make ...`) that would otherwise keep our pipes open.
            cmd.process_group(0);
        }
        cmd
    }

    /// Spawn without waiting; stdout/stderr are discarded.
    ///
    /// Used for long-lived helpers such as a benchmark's server process.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the program cannot be spawned.
    pub fn spawn_detached(&self) -> Result<Child> {
        let mut cmd = self.to_command();
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        cmd.spawn().map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to spawn `{self}`: {e}")).into()
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished (or killed) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status as reported by the OS
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8)
    pub stdout: String,
    /// Captured standard error (lossy UTF-8)
    pub stderr: String,
    /// Wall-clock time from spawn to exit, taken when the blocking wait
    /// returns
    pub elapsed: Duration,
    /// The child was killed because it exceeded its limit
    pub timed_out: bool,
}

impl CommandOutput {
    /// True if the command exited with status zero within its limit.
    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Human-readable summary of how the command ended.
    #[must_use]
    pub fn describe_status(&self) -> String {
        if self.timed_out {
            return format!("timed out after {:.3}s", self.elapsed.as_secs_f64());
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt as _;
            if let Some(signal) = self.status.signal() {
                return format!("terminated by signal {signal}");
            }
        }
        self.status.to_string()
    }

    /// True if either output stream contains `marker`.
    #[must_use]
    pub fn mentions(&self, marker: &str) -> bool {
        self.stdout.contains(marker) || self.stderr.contains(marker)
    }
}

/// Run `spec` to completion and capture its output.
///
/// A non-zero exit is *not* an error here; callers classify it. Elapsed
/// time covers spawn through exit.
///
/// # Errors
///
/// Returns an IO error if the program cannot be spawned or waited on.
pub fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    tracing::trace!(command = %spec, cwd = ?spec.cwd, "spawning");
    let start = Instant::now();
    let mut child = spec.to_command().spawn().map_err(|e| {
        std::io::Error::new(e.kind(), format!("failed to spawn `{spec}`: {e}"))
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let (status, elapsed, timed_out) = wait_with_deadline(&mut child, start, spec.timeout)?;

    Ok(CommandOutput {
        status,
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
        elapsed,
        timed_out,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            // A read error just truncates the capture.
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_drain(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Block on the child and stop the clock when `wait` returns. A watchdog
/// thread enforces `limit` by killing the process group.
fn wait_with_deadline(
    child: &mut Child,
    start: Instant,
    limit: Option<Duration>,
) -> Result<(ExitStatus, Duration, bool)> {
    let Some(limit) = limit else {
        let status = child.wait()?;
        return Ok((status, start.elapsed(), false));
    };

    let pid = child.id();
    let (done, exited) = mpsc::channel::<()>();
    let watchdog = thread::spawn(move || match exited.recv_timeout(limit) {
        Err(RecvTimeoutError::Timeout) => {
            kill_pid_group(pid);
            true
        }
        _ => false,
    });

    let waited = child.wait();
    let elapsed = start.elapsed();
    // The receiver is gone once the watchdog fired; nothing to cancel then.
    let _ = done.send(());
    let timed_out = watchdog.join().unwrap_or(false);
    Ok((waited?, elapsed, timed_out))
}

/// Kill `child` and everything in its process group.
///
/// The child may already have exited; errors are ignored.
pub fn kill_group(child: &mut Child) {
    kill_pid_group(child.id());
    let _ = child.kill();
}

/// `SIGKILL` the process group led by `pid`.
fn kill_pid_group(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(pid) {
            // SAFETY: plain syscall on a process group we created.
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_stdout_and_stderr() {
        let out = run(&CommandSpec::new("sh").args(["-c", "echo hello; echo oops >&2"])).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let out = run(&CommandSpec::new("sh").args(["-c", "exit 3"])).unwrap();
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
    }

    #[test]
    fn test_timeout_kills_child() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Some(Duration::from_millis(100)));
        let out = run(&spec).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(out.elapsed < Duration::from_secs(5));
        assert!(out.describe_status().starts_with("timed out"));
    }

    #[test]
    fn test_stdin_is_closed() {
        // `read` sees EOF immediately instead of blocking.
        let spec = CommandSpec::new("sh")
            .args(["-c", "read line || echo eof"])
            .timeout(Some(Duration::from_secs(5)));
        let out = run(&spec).unwrap();
        assert!(!out.timed_out);
        assert!(out.stdout.contains("eof"));
    }

    #[test]
    fn test_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $FLAGBENCH_PROBE; pwd"])
            .env("FLAGBENCH_PROBE", "-O2 -flto")
            .cwd(dir.path());
        let out = run(&spec).unwrap();
        let mut lines = out.stdout.lines();
        assert_eq!(lines.next(), Some("-O2 -flto"));
        let pwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(pwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_timeout_reaches_grandchildren() {
        // Without the group kill, the orphaned `sleep` holds stdout open and
        // the drain thread blocks for the full five seconds.
        let spec = CommandSpec::new("sh")
            .args(["-c", "sleep 5; echo late"])
            .timeout(Some(Duration::from_millis(100)));
        let started = Instant::now();
        let out = run(&spec).unwrap();
        assert!(out.timed_out);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!out.stdout.contains("late"));
    }

    fn mean_elapsed(spec: &CommandSpec, n: u32) -> f64 {
        let total: f64 = (0..n)
            .map(|_| run(spec).unwrap().elapsed.as_secs_f64())
            .sum();
        total / f64::from(n)
    }

    #[test]
    fn test_elapsed_unaffected_by_timeout() {
        let plain = CommandSpec::new("true");
        let limited = plain.clone().timeout(Some(Duration::from_secs(60)));
        // Warm the page cache for `true`.
        mean_elapsed(&plain, 3);
        let without = mean_elapsed(&plain, 20);
        let with = mean_elapsed(&limited, 20);
        assert!(
            (with - without).abs() < 0.002,
            "no limit {without:.6}s, with limit {with:.6}s"
        );
    }

    #[test]
    fn test_elapsed_covers_child_runtime() {
        let spec = CommandSpec::new("sleep")
            .arg("0.01")
            .timeout(Some(Duration::from_secs(10)));
        let out = run(&spec).unwrap();
        assert!(out.success());
        assert!(!out.timed_out);
        assert!(out.elapsed >= Duration::from_millis(10));
    }

    #[test]
    fn test_spawn_failure_is_error() {
        let result = run(&CommandSpec::new("/nonexistent/flagbench-no-such-tool"));
        assert!(result.is_err());
    }

    #[test]
    fn test_display_quotes_whitespace() {
        let spec = CommandSpec::new("cmake").args(["-DCMAKE_C_FLAGS=-O2 -flto", "-S", "."]);
        assert_eq!(spec.to_string(), "cmake '-DCMAKE_C_FLAGS=-O2 -flto' -S .");
    }
}
