use serde::Serialize;

use super::mode::CicdMode;
use super::{INTERNAL_INTERFACE, INTERNAL_PORT, PUBLIC_PORT};

/// Body of a create-pipeline request, in the control plane's key spelling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PipelineSpec {
    #[serde(rename = "CICDMode")]
    pub cicd_mode: CicdMode,
    #[serde(rename = "isNeedToCreateRepo")]
    pub create_repository: bool,
    #[serde(rename = "pipelineName")]
    pub pipeline_name: String,
    #[serde(rename = "vmID")]
    pub vm_id: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "configData")]
    pub config: ConfigData,
    #[serde(rename = "gitData")]
    pub git: GitData,
    pub ports: Vec<PortMapping>,
    #[serde(rename = "exposedPorts")]
    pub exposed_ports: Vec<ExposedPort>,
    /// Dotenv-formatted environment for the app.
    pub variables: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigData {
    pub build_command: String,
    pub build_dir: String,
    pub install_command: String,
    pub run_command: String,
    pub framework: String,
    pub version: String,
    pub runtime: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GitData {
    #[serde(rename = "projectName")]
    pub project_name: String,
    pub branch: String,
    #[serde(rename = "repoUrl")]
    pub repo_url: String,
    pub repo: String,
    #[serde(rename = "repoId")]
    pub repo_id: String,
    pub owner: String,
    #[serde(rename = "authID")]
    pub auth_id: String,
}

/// Public listener on the target's reverse proxy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub protocol: String,
    pub target_protocol: String,
    pub listening_port: u16,
    pub target_port: u16,
    #[serde(rename = "targetIP")]
    pub target_ip: String,
    pub public: bool,
    pub path: String,
}

impl PortMapping {
    /// HTTPS on 443 forwarded to HTTP on the internal app port.
    #[must_use]
    pub fn public_https() -> Self {
        Self {
            protocol: "HTTPS".to_string(),
            target_protocol: "HTTP".to_string(),
            listening_port: PUBLIC_PORT,
            target_port: INTERNAL_PORT,
            target_ip: INTERNAL_INTERFACE.to_string(),
            public: true,
            path: "/".to_string(),
        }
    }
}

/// Container port published on the target's docker bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposedPort {
    pub protocol: String,
    pub host_port: u16,
    pub container_port: u16,
    pub interface: String,
}

impl ExposedPort {
    #[must_use]
    pub fn internal(container_port: u16) -> Self {
        Self {
            protocol: "HTTP".to_string(),
            host_port: INTERNAL_PORT,
            container_port,
            interface: INTERNAL_INTERFACE.to_string(),
        }
    }
}
