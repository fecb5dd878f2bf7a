//! Runs the `rbd` binary with a deadline. Every call is its own short-lived
//! cluster session: the child is always reaped, and killed on timeout.

use clonechain_core::error::{ClonechainError, ClonechainResult};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
/// A binary plus the deadline applied to each invocation.
pub struct CommandRunner {
    path: PathBuf,
    timeout: Duration,
}

/// How an invocation ended.
#[derive(Debug)]
pub enum Outcome {
    Exited(Output),
    /// Killed at the deadline.
    TimedOut(Duration),
}

#[derive(Debug)]
/// Captured result of a finished command.
pub struct Output {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl Output {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// The most useful text to show for a failure: stderr, else stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

impl CommandRunner {
    pub fn new(path: PathBuf, timeout: Duration) -> Self {
        Self { path, timeout }
    }

    pub fn binary(&self) -> &Path {
        &self.path
    }

    /// Execute the binary with `args` and capture its output.
    ///
    /// A command still running at the deadline is killed and reported as
    /// `Outcome::TimedOut`; its partial output is discarded.
    pub fn run(&self, args: &[String]) -> ClonechainResult<Outcome> {
        let mut child = Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let Some(status) = self.wait(&mut child)? else {
            return Ok(Outcome::TimedOut(self.timeout));
        };
        let stdout = join(stdout, "stdout")?;
        let stderr = join(stderr, "stderr")?;

        Ok(Outcome::Exited(Output {
            stdout,
            stderr,
            status,
        }))
    }

    /// Poll the child until it exits (`Some(code)`) or the deadline passes (`None`).
    fn wait(&self, child: &mut Child) -> ClonechainResult<Option<i32>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status.code().unwrap_or(-1)));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

type Drain = thread::JoinHandle<ClonechainResult<String>>;

/// Read a pipe to the end on a helper thread so the child never blocks on a full pipe.
fn drain<R>(pipe: Option<R>) -> Drain
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> ClonechainResult<String> {
        let mut buf = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut buf)?;
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn join(handle: Drain, stream: &str) -> ClonechainResult<String> {
    handle
        .join()
        .map_err(|_| ClonechainError::Provider(format!("{stream} reader thread panicked")))?
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> CommandRunner {
        CommandRunner::new(PathBuf::from("/bin/sh"), Duration::from_secs(5))
    }

    fn args(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    fn exited(outcome: Outcome) -> Output {
        match outcome {
            Outcome::Exited(out) => out,
            Outcome::TimedOut(after) => panic!("timed out after {after:?}"),
        }
    }

    #[test]
    fn captures_streams_and_status() {
        let out = exited(sh().run(&args("echo out; echo err >&2; exit 3")).unwrap());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert_eq!(out.status, 3);
        assert!(!out.success());
        assert_eq!(out.diagnostic(), "err");
    }

    #[test]
    fn diagnostic_falls_back_to_stdout() {
        let out = exited(sh().run(&args("echo only-stdout; exit 1")).unwrap());
        assert_eq!(out.diagnostic(), "only-stdout");
    }

    #[test]
    fn kills_commands_past_the_deadline() {
        let runner = CommandRunner::new(PathBuf::from("/bin/sh"), Duration::from_millis(100));
        let started = Instant::now();
        match runner.run(&args("exec sleep 5")).unwrap() {
            Outcome::TimedOut(after) => assert_eq!(after, Duration::from_millis(100)),
            Outcome::Exited(out) => panic!("expected a timeout, got {out:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_binary_is_an_io_error() {
        let runner = CommandRunner::new(PathBuf::from("/nonexistent/rbd"), Duration::from_secs(1));
        assert!(matches!(runner.run(&[]), Err(ClonechainError::Io(_))));
    }
}
