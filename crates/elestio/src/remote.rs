//! SSH access to CI/CD targets through the local `ssh` and `ssh-keygen`
//! binaries.

mod keys;
mod process;
mod ssh;

pub use keys::{ensure_key_pair, register_public_key, KeyRegistration, PublicKey};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub(crate) use ssh::shell_quote;
pub use ssh::SshBridge;
