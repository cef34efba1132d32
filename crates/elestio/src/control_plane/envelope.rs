use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ElestioError, Result};

/// Wording the gateway uses when the session JWT itself is rejected. Other
/// token failures (git provider tokens, API tokens) must not match.
const SESSION_REJECTED_HINTS: [&str; 6] = [
    "jwt",
    "invalid token",
    "token expired",
    "expired token",
    "session expired",
    "not authenticated",
];

/// List responses come back either as a bare JSON array or wrapped in a
/// status envelope, depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RemoteList<T> {
    Bare(Vec<T>),
    Enveloped {
        status: Option<String>,
        message: Option<String>,
        #[serde(
            alias = "items",
            alias = "servers",
            alias = "pipelines",
            alias = "repositories",
            alias = "organizations"
        )]
        data: Option<Vec<T>>,
    },
}

impl<T: DeserializeOwned> RemoteList<T> {
    /// Parses and normalizes a list response into its items.
    ///
    /// # Errors
    ///
    /// Returns [`ElestioError::RemoteCallFailed`] when the body matches neither
    /// shape or the envelope carries a failure status.
    pub fn from_value(endpoint: &str, value: Value) -> Result<Vec<T>> {
        serde_json::from_value::<Self>(value)
            .map_err(|error| {
                ElestioError::remote_call(endpoint, format!("unexpected list shape: {error}"))
            })?
            .into_items(endpoint)
    }

    /// # Errors
    ///
    /// Returns [`ElestioError::RemoteCallFailed`] for `KO`/`error` envelopes.
    pub fn into_items(self, endpoint: &str) -> Result<Vec<T>> {
        match self {
            Self::Bare(items) => Ok(items),
            Self::Enveloped {
                status,
                message,
                data,
            } => {
                if status.as_deref().is_some_and(is_failure_status) {
                    return Err(ElestioError::remote_call(
                        endpoint,
                        message.unwrap_or_else(|| "request rejected".to_string()),
                    ));
                }
                Ok(data.unwrap_or_default())
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StatusCheck {
    Ok,
    AuthRejected(String),
    Failed(String),
}

/// Classifies the application-level status of any response body.
pub(crate) fn inspect_status(value: &Value) -> StatusCheck {
    let Some(status) = value.get("status").and_then(Value::as_str) else {
        return StatusCheck::Ok;
    };

    if !is_failure_status(status) {
        return StatusCheck::Ok;
    }

    let message = response_message(value).unwrap_or_else(|| format!("status {status}"));
    let lowered = message.to_ascii_lowercase();
    if SESSION_REJECTED_HINTS.iter().any(|hint| lowered.contains(hint)) {
        StatusCheck::AuthRejected(message)
    } else {
        StatusCheck::Failed(message)
    }
}

pub(crate) fn response_message(value: &Value) -> Option<String> {
    ["message", "error", "msg"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(ToString::to_string)
}

fn is_failure_status(status: &str) -> bool {
    status.eq_ignore_ascii_case("KO") || status.eq_ignore_ascii_case("error")
}
