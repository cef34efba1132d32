use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::control_plane::{response_message, ControlPlane, Endpoint, Method};
use crate::error::{ElestioError, Result};
use crate::git::Repository;

mod mode;
mod spec;

#[cfg(test)]
mod tests;

pub use mode::{AppKind, CicdMode, DeployMode, ModeDefaults};
pub use spec::{ConfigData, ExposedPort, GitData, PipelineSpec, PortMapping};

pub const PUBLIC_PORT: u16 = 443;
pub const INTERNAL_PORT: u16 = 3000;
/// Docker bridge address the target's reverse proxy forwards to.
pub const INTERNAL_INTERFACE: &str = "172.17.0.1";

const DEFAULT_BRANCH: &str = "main";

/// Caller-supplied values that replace mode defaults field by field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineOverrides {
    pub branch: Option<String>,
    pub build_command: Option<String>,
    pub run_command: Option<String>,
    pub install_command: Option<String>,
    pub build_dir: Option<String>,
    pub framework: Option<String>,
    pub version: Option<String>,
}

/// A resolved repository and the authorization that can read it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitSource {
    pub repository: Repository,
    pub auth_id: String,
}

#[derive(Clone, Debug)]
pub struct PipelineRequest {
    pub mode: DeployMode,
    pub pipeline_name: String,
    pub vm_id: String,
    pub project_id: String,
    /// Required for git modes, rejected for docker mode.
    pub source: Option<GitSource>,
    pub overrides: PipelineOverrides,
}

/// What the control plane reported for a created pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CreatedPipeline {
    pub pipeline_id: Option<String>,
    pub url: Option<String>,
    pub message: Option<String>,
}

/// # Errors
///
/// Returns [`ElestioError::InvalidInput`] when the pipeline name is not a
/// lowercase slug.
pub fn validate_pipeline_name(name: &str) -> Result<()> {
    let regex = Regex::new(r"^[a-z0-9][a-z0-9-]*$")
        .map_err(|error| ElestioError::InvalidInput(format!("invalid name validator: {error}")))?;

    if !regex.is_match(name) {
        return Err(ElestioError::InvalidInput(format!(
            "pipeline name must be lowercase letters, digits and dashes, got '{name}'"
        )));
    }

    Ok(())
}

/// # Errors
///
/// Returns [`ElestioError::InvalidInput`] for branch names outside the
/// allowed character set.
pub fn validate_branch(branch: &str) -> Result<()> {
    let regex = Regex::new(r"^[A-Za-z0-9._/-]+$")
        .map_err(|error| ElestioError::InvalidInput(format!("invalid branch validator: {error}")))?;

    if !regex.is_match(branch) {
        return Err(ElestioError::InvalidInput(format!(
            "branch contains unsupported characters: '{branch}'"
        )));
    }

    Ok(())
}

/// Builds the create-pipeline body for `request`. Runs all validation, so a
/// returned spec is safe to submit.
///
/// # Errors
///
/// Returns [`ElestioError::InvalidInput`] for a bad name or branch, a git
/// mode without a repository, or docker mode with one, and
/// [`ElestioError::MissingConfig`] when the project id is empty.
pub fn build_spec(request: &PipelineRequest) -> Result<PipelineSpec> {
    validate_pipeline_name(&request.pipeline_name)?;
    if request.project_id.trim().is_empty() {
        return Err(ElestioError::MissingConfig("project id"));
    }
    if request.vm_id.trim().is_empty() {
        return Err(ElestioError::InvalidInput("target vm id is empty".to_string()));
    }
    if let Some(branch) = non_empty(request.overrides.branch.as_deref()) {
        validate_branch(branch)?;
    }

    let mode = request.mode;
    let (create_repository, git) = match (mode.provider(), &request.source) {
        (Some(provider), Some(source)) => (false, git_data(request, provider.host(), source)),
        (Some(_), None) => {
            return Err(ElestioError::InvalidInput(format!(
                "{mode} mode requires a repository in owner/name form"
            )))
        }
        (None, Some(_)) => {
            return Err(ElestioError::InvalidInput(
                "docker mode creates its own repository and does not take one".to_string(),
            ))
        }
        (None, None) => (
            true,
            GitData {
                project_name: request.pipeline_name.clone(),
                branch: branch_or(request, None),
                ..GitData::default()
            },
        ),
    };

    let defaults = mode.defaults();
    Ok(PipelineSpec {
        cicd_mode: mode.cicd_mode(),
        create_repository,
        pipeline_name: request.pipeline_name.clone(),
        vm_id: request.vm_id.trim().to_string(),
        project_id: request.project_id.trim().to_string(),
        config: config_data(mode, &request.overrides),
        git,
        ports: vec![PortMapping::public_https()],
        exposed_ports: vec![ExposedPort::internal(defaults.container_port)],
        variables: String::new(),
    })
}

/// Submits `spec` and interprets the answer.
///
/// # Errors
///
/// Returns [`ElestioError::RemoteCallFailed`] carrying the control plane's
/// message when the response neither identifies a pipeline nor reports `OK`.
pub async fn create(api: &dyn ControlPlane, spec: &PipelineSpec) -> Result<CreatedPipeline> {
    let body = serde_json::to_value(spec).map_err(|error| {
        ElestioError::InvalidInput(format!("pipeline spec is not serializable: {error}"))
    })?;

    info!(
        pipeline = %spec.pipeline_name,
        vm_id = %spec.vm_id,
        mode = spec.cicd_mode.as_str(),
        "creating pipeline"
    );
    let response = api.call(Endpoint::CreatePipeline, Method::Post, body).await?;
    let created = interpret_create_response(&response)?;
    debug!(pipeline_id = ?created.pipeline_id, url = ?created.url, "pipeline created");

    Ok(created)
}

fn interpret_create_response(response: &Value) -> Result<CreatedPipeline> {
    let scopes = [Some(response), response.get("data").filter(|data| data.is_object())];
    let field = |keys: &[&str]| {
        scopes
            .iter()
            .flatten()
            .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
            .find_map(scalar_string)
    };

    let pipeline_id = field(&["id", "pipelineID", "pipelineId"]);
    let status_ok = response
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|status| status.eq_ignore_ascii_case("ok"));
    let message = response_message(response);

    if pipeline_id.is_none() && !status_ok {
        return Err(ElestioError::remote_call(
            Endpoint::CreatePipeline.name(),
            message.unwrap_or_else(|| response.to_string()),
        ));
    }

    Ok(CreatedPipeline {
        pipeline_id,
        url: field(&["url", "domain", "cname"]),
        message,
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn pick(value: Option<&String>, default: &str) -> String {
    non_empty(value.map(String::as_str)).unwrap_or(default).to_string()
}

fn branch_or(request: &PipelineRequest, repository_default: Option<&str>) -> String {
    non_empty(request.overrides.branch.as_deref())
        .or_else(|| non_empty(repository_default))
        .unwrap_or(DEFAULT_BRANCH)
        .to_string()
}

fn config_data(mode: DeployMode, overrides: &PipelineOverrides) -> ConfigData {
    let defaults = if mode.app_kind() == AppKind::Docker {
        // Docker mode only forwards what the caller asked for.
        ModeDefaults {
            runtime: "",
            build_dir: "",
            build_command: "",
            run_command: "",
            install_command: "",
            container_port: mode.defaults().container_port,
        }
    } else {
        mode.defaults()
    };

    ConfigData {
        build_command: pick(overrides.build_command.as_ref(), defaults.build_command),
        build_dir: pick(overrides.build_dir.as_ref(), defaults.build_dir),
        install_command: pick(overrides.install_command.as_ref(), defaults.install_command),
        run_command: pick(overrides.run_command.as_ref(), defaults.run_command),
        framework: pick(overrides.framework.as_ref(), ""),
        version: pick(overrides.version.as_ref(), ""),
        runtime: defaults.runtime.to_string(),
    }
}

fn git_data(request: &PipelineRequest, host: &str, source: &GitSource) -> GitData {
    let repository = &source.repository;
    GitData {
        project_name: request.pipeline_name.clone(),
        branch: branch_or(request, repository.default_branch.as_deref()),
        repo_url: format!("https://{host}/{}", repository.full_name),
        repo: repository.full_name.clone(),
        repo_id: repository.id.clone(),
        owner: repository.owner.clone(),
        auth_id: source.auth_id.clone(),
    }
}
