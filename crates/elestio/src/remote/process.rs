use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }

    /// Trimmed stderr, falling back to stdout and then the exit code.
    #[must_use]
    pub fn failure_detail(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.status_code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs local programs. Swapped for an in-memory fake in tests.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the program cannot be spawned, or
    /// [`io::ErrorKind::TimedOut`] when it outlives `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> io::Result<ProcessOutput>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> io::Result<ProcessOutput> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let input = stdin.map(<[u8]>::to_vec);
        let mut child_stdin = child.stdin.take();

        let completed = tokio::time::timeout(timeout, async move {
            if let (Some(pipe), Some(bytes)) = (child_stdin.as_mut(), input) {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await?;
            }
            drop(child_stdin);
            child.wait_with_output().await
        })
        .await;

        let output = match completed {
            Ok(output) => output?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{program} did not finish within {}s", timeout.as_secs()),
                ))
            }
        };

        Ok(ProcessOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
