use thiserror::Error;

/// Errors surfaced by the control-plane, resolver, provisioning and SSH layers.
#[derive(Debug, Error)]
pub enum ElestioError {
    /// A required identifier or credential was not configured.
    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    /// Caller input failed validation before any remote call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("repository must be in owner/name format, got '{0}'")]
    InvalidRepoFormat(String),

    /// The repository is not visible under the selected authorization.
    #[error("repository '{repo}' not found; available: {}", available.join(", "))]
    RepoNotFound { repo: String, available: Vec<String> },

    #[error("CI/CD target {vm_id} not found in project {project_id}")]
    TargetNotFound { vm_id: String, project_id: String },

    /// No pipeline in the project carries an authorization for the provider.
    /// Linking the git account happens out of band in the dashboard.
    #[error("no {provider} authorization found; link the account in the dashboard or pass --auth-id")]
    NoAuthFound { provider: String },

    #[error("remote call to {endpoint} failed: {message}")]
    RemoteCallFailed { endpoint: String, message: String },

    #[error("remote command `{command}` failed: {cause}")]
    RemoteExecFailed { command: String, cause: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ElestioError {
    pub(crate) fn remote_call(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub(crate) fn remote_exec(command: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::RemoteExecFailed {
            command: command.into(),
            cause: cause.into(),
        }
    }
}

pub type Result<T, E = ElestioError> = std::result::Result<T, E>;
