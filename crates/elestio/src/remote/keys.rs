use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::control_plane::{response_message, ControlPlane, Endpoint, Method};
use crate::error::{ElestioError, Result};

use super::process::ProcessRunner;

const KEYGEN_TIMEOUT: Duration = Duration::from_secs(30);
const SSH_KEYGEN_BIN: &str = "ssh-keygen";

/// An OpenSSH public key reduced to `<type> <material>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub key_type: String,
    pub material: String,
}

impl PublicKey {
    /// Parses an OpenSSH `.pub` line, dropping any trailing comment.
    ///
    /// # Errors
    ///
    /// Returns [`ElestioError::InvalidInput`] when the line does not have a
    /// key type followed by base64 material.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let (Some(key_type), Some(material)) = (parts.next(), parts.next()) else {
            return Err(ElestioError::InvalidInput(
                "public key must be '<type> <base64>'".to_string(),
            ));
        };

        if !key_type.starts_with("ssh-") && !key_type.starts_with("ecdsa-") {
            return Err(ElestioError::InvalidInput(format!(
                "unsupported public key type '{key_type}'"
            )));
        }
        if base64::engine::general_purpose::STANDARD
            .decode(material)
            .is_err()
        {
            return Err(ElestioError::InvalidInput(
                "public key material is not base64".to_string(),
            ));
        }

        Ok(Self {
            key_type: key_type.to_string(),
            material: material.to_string(),
        })
    }

    #[must_use]
    pub fn authorized_line(&self) -> String {
        format!("{} {}", self.key_type, self.material)
    }

    /// `SHA256:<unpadded base64>` of the decoded key blob, as `ssh-keygen -l`
    /// prints it.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(&self.material)
            .unwrap_or_default();
        let digest = Sha256::digest(blob);
        format!(
            "SHA256:{}",
            base64::engine::general_purpose::STANDARD_NO_PAD.encode(digest)
        )
    }
}

/// Outcome of adding a key to a target's authorized keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyRegistration {
    Added,
    /// The target reported the key as already authorized.
    AlreadyPresent,
}

/// Makes sure an ed25519 key pair exists at `private_key_path` and returns
/// its public half. Generates a pair when the private key is missing and
/// re-derives the `.pub` file when only it is missing.
///
/// # Errors
///
/// Returns an error if `ssh-keygen` cannot run or fails, or the public key
/// file is unreadable or malformed.
pub async fn ensure_key_pair(
    runner: &dyn ProcessRunner,
    private_key_path: &Path,
) -> Result<PublicKey> {
    let public_key_path = public_key_path(private_key_path);

    match (private_key_path.exists(), public_key_path.exists()) {
        (false, _) => {
            if let Some(parent) = private_key_path.parent() {
                fs::create_dir_all(parent)?;
            }
            info!(path = %private_key_path.display(), "generating SSH key pair");
            run_keygen(
                runner,
                &[
                    "-t".to_string(),
                    "ed25519".to_string(),
                    "-N".to_string(),
                    String::new(),
                    "-C".to_string(),
                    "elestio-cli".to_string(),
                    "-f".to_string(),
                    path_arg(private_key_path)?,
                    "-q".to_string(),
                ],
            )
            .await?;
        }
        (true, false) => {
            debug!(path = %public_key_path.display(), "deriving missing public key");
            let stdout = run_keygen(
                runner,
                &["-y".to_string(), "-f".to_string(), path_arg(private_key_path)?],
            )
            .await?;
            fs::write(&public_key_path, stdout)?;
        }
        (true, true) => {}
    }

    let raw = fs::read_to_string(&public_key_path)?;
    PublicKey::parse(&raw)
}

/// Adds `key` to the target's authorized keys. An "already" answer from the
/// control plane counts as success.
///
/// # Errors
///
/// Returns [`ElestioError::RemoteCallFailed`] for any other rejection.
pub async fn register_public_key(
    api: &dyn ControlPlane,
    vm_id: &str,
    key_name: &str,
    key: &PublicKey,
) -> Result<KeyRegistration> {
    let body = json!({
        "vmID": vm_id,
        "action": "SSHPubKeysAdd",
        "name": key_name,
        "key": key.authorized_line(),
    });

    match api.call(Endpoint::ServerAction, Method::Post, body).await {
        Ok(value) => {
            if response_message(&value).is_some_and(|message| mentions_already(&message)) {
                return Ok(KeyRegistration::AlreadyPresent);
            }
            Ok(KeyRegistration::Added)
        }
        Err(ElestioError::RemoteCallFailed { message, .. }) if mentions_already(&message) => {
            debug!(vm_id, "public key already authorized");
            Ok(KeyRegistration::AlreadyPresent)
        }
        Err(error) => Err(error),
    }
}

pub(crate) fn public_key_path(private_key_path: &Path) -> PathBuf {
    let mut raw = OsString::from(private_key_path.as_os_str());
    raw.push(".pub");
    PathBuf::from(raw)
}

fn mentions_already(message: &str) -> bool {
    message.to_ascii_lowercase().contains("already")
}

fn path_arg(path: &Path) -> Result<String> {
    path.to_str()
        .map(ToString::to_string)
        .ok_or_else(|| ElestioError::InvalidInput(format!("invalid key path: {}", path.display())))
}

async fn run_keygen(runner: &dyn ProcessRunner, args: &[String]) -> Result<String> {
    let command = format!("{SSH_KEYGEN_BIN} {}", args.join(" "));
    let output = runner
        .run(SSH_KEYGEN_BIN, args, None, KEYGEN_TIMEOUT)
        .await
        .map_err(|error| ElestioError::remote_exec(&command, error.to_string()))?;

    if !output.success() {
        return Err(ElestioError::remote_exec(command, output.failure_detail()));
    }

    Ok(output.stdout)
}
