use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tracing::{debug, info};

use crate::control_plane::ControlPlane;
use crate::error::{ElestioError, Result};

use super::keys::{ensure_key_pair, register_public_key, KeyRegistration};
use super::process::ProcessRunner;

const SSH_BIN: &str = "ssh";
const KEY_NAME: &str = "elestio-cli";
const CONNECT_TIMEOUT_SECONDS: u64 = 15;

/// Runs commands on CI/CD targets over SSH with a locally held key that is
/// registered with each target through the control plane.
pub struct SshBridge {
    api: Arc<dyn ControlPlane>,
    runner: Arc<dyn ProcessRunner>,
    key_path: PathBuf,
    user: String,
    settle: Duration,
    registered: HashSet<(String, String)>,
}

impl fmt::Debug for SshBridge {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SshBridge")
            .field("key_path", &self.key_path)
            .field("user", &self.user)
            .field("settle", &self.settle)
            .field("registered", &self.registered.len())
            .finish_non_exhaustive()
    }
}

impl SshBridge {
    #[must_use]
    pub fn new(
        api: Arc<dyn ControlPlane>,
        runner: Arc<dyn ProcessRunner>,
        key_path: PathBuf,
        user: &str,
        settle: Duration,
    ) -> Self {
        Self {
            api,
            runner,
            key_path,
            user: user.to_string(),
            settle,
            registered: HashSet::new(),
        }
    }

    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Ensures the local key pair exists and is authorized on `vm_id`.
    ///
    /// Registration happens at most once per target and key for the life of
    /// the bridge. After a fresh registration the call waits `settle` so the
    /// target can pick up the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key pair cannot be prepared or the control
    /// plane refuses the key.
    pub async fn ensure_access(&mut self, vm_id: &str) -> Result<PathBuf> {
        let public_key = ensure_key_pair(self.runner.as_ref(), &self.key_path).await?;
        let ledger_entry = (vm_id.to_string(), public_key.fingerprint());

        if self.registered.contains(&ledger_entry) {
            debug!(vm_id, "SSH key already registered this run");
            return Ok(self.key_path.clone());
        }

        let registration =
            register_public_key(self.api.as_ref(), vm_id, KEY_NAME, &public_key).await?;
        if registration == KeyRegistration::Added && !self.settle.is_zero() {
            info!(
                vm_id,
                settle_seconds = self.settle.as_secs(),
                "registered SSH key, waiting for target to apply it"
            );
            tokio::time::sleep(self.settle).await;
        }

        self.registered.insert(ledger_entry);
        Ok(self.key_path.clone())
    }

    /// Runs `command` on `address` and returns its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ElestioError::RemoteExecFailed`] on connection failure,
    /// non-zero exit, or timeout.
    pub async fn execute(&self, address: &str, command: &str, timeout: Duration) -> Result<String> {
        self.run_ssh(address, command, None, timeout).await
    }

    /// Writes `contents` to `path` on `address`, creating parent directories.
    /// The payload travels base64-encoded on stdin so no shell quoting of the
    /// contents is needed.
    ///
    /// # Errors
    ///
    /// Returns [`ElestioError::RemoteExecFailed`] when the write fails.
    pub async fn write_file(
        &self,
        address: &str,
        path: &str,
        contents: &str,
        timeout: Duration,
    ) -> Result<()> {
        let directory = Path::new(path)
            .parent()
            .and_then(Path::to_str)
            .filter(|value| !value.is_empty())
            .unwrap_or("/");
        let command = format!(
            "mkdir -p {} && base64 -d > {}",
            shell_quote(directory),
            shell_quote(path)
        );
        let payload = base64::engine::general_purpose::STANDARD.encode(contents);

        self.run_ssh(address, &command, Some(payload.as_bytes()), timeout)
            .await
            .map(|_| ())
    }

    fn ssh_args(&self, address: &str, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.key_path.display().to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECONDS}"),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("{}@{address}", self.user),
            command.to_string(),
        ]
    }

    async fn run_ssh(
        &self,
        address: &str,
        command: &str,
        stdin: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<String> {
        debug!(address, command, "running remote command");
        let args = self.ssh_args(address, command);
        let output = self
            .runner
            .run(SSH_BIN, &args, stdin, timeout)
            .await
            .map_err(|error| ElestioError::remote_exec(command, error.to_string()))?;

        if !output.success() {
            return Err(ElestioError::remote_exec(command, output.failure_detail()));
        }

        Ok(output.stdout)
    }
}

/// Single-quotes `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
