use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A provisioned VM that hosts CI/CD pipelines.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CiCdTarget {
    #[serde(rename = "vmID", deserialize_with = "flexible_string")]
    pub vm_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(rename = "ipv4", default)]
    pub address: Option<String>,
    #[serde(default)]
    pub cname: Option<String>,
    #[serde(
        rename = "projectID",
        default,
        deserialize_with = "flexible_optional_string"
    )]
    pub project_id: Option<String>,
}

impl CiCdTarget {
    #[must_use]
    pub fn reachable_address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// A pipeline already deployed on a target, as listed by the control plane.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PipelineSummary {
    #[serde(
        rename = "pipelineID",
        default,
        deserialize_with = "flexible_optional_string"
    )]
    pub pipeline_id: Option<String>,
    #[serde(rename = "pipelineName", default)]
    pub name: String,
    #[serde(rename = "gitType", default)]
    pub git_type: Option<String>,
    #[serde(rename = "CICDMode", default)]
    pub cicd_mode: Option<String>,
    #[serde(
        rename = "authID",
        default,
        deserialize_with = "flexible_optional_string"
    )]
    pub auth_id: Option<String>,
}

impl PipelineSummary {
    /// Provider kind recorded on the pipeline, preferring `gitType`.
    #[must_use]
    pub fn provider_kind(&self) -> Option<&str> {
        self.git_type
            .as_deref()
            .or(self.cicd_mode.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    #[must_use]
    pub fn usable_auth_id(&self) -> Option<&str> {
        self.auth_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "0")
    }
}

pub(crate) fn flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

pub(crate) fn flexible_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        other => Err(de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}
