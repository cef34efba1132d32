use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ElestioError, Result};
use crate::pipeline::{AppKind, ConfigData, DeployMode, INTERNAL_INTERFACE, INTERNAL_PORT};
use crate::remote::shell_quote;

const APP_ROOT: &str = "/opt/app";
const DEFAULT_NODE_VERSION: &str = "20";

/// A file whose contents are computed locally and written to the target,
/// replacing whatever was there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFileArtifact {
    pub path: String,
    pub contents: String,
}

#[must_use]
pub fn app_dir(pipeline_name: &str) -> String {
    format!("{APP_ROOT}/{pipeline_name}")
}

/// Files to write for `mode`. Docker mode keeps the repository's own
/// Dockerfile and only gets a compose file.
///
/// # Errors
///
/// Returns an error if the compose file cannot be rendered.
pub fn artifacts_for(
    mode: DeployMode,
    pipeline_name: &str,
    config: &ConfigData,
) -> Result<Vec<RemoteFileArtifact>> {
    let directory = app_dir(pipeline_name);
    let file = |name: &str, contents: String| RemoteFileArtifact {
        path: format!("{directory}/{name}"),
        contents,
    };

    let mut artifacts = match mode.app_kind() {
        AppKind::StaticSite => vec![
            file("Dockerfile", static_site_dockerfile(config)),
            file("nginx.conf", spa_nginx_conf()),
        ],
        AppKind::NodeServer => vec![file("Dockerfile", node_server_dockerfile(config))],
        AppKind::Docker => Vec::new(),
    };
    artifacts.push(file(
        "docker-compose.yml",
        compose_file(pipeline_name, mode.defaults().container_port)?,
    ));

    Ok(artifacts)
}

/// Creates the app's `.env` file without touching existing contents.
#[must_use]
pub fn touch_env_command(pipeline_name: &str) -> String {
    format!("touch {}", shell_quote(&format!("{}/.env", app_dir(pipeline_name))))
}

#[must_use]
pub fn compose_command(pipeline_name: &str, arguments: &str) -> String {
    format!(
        "cd {} && docker compose {arguments} 2>&1",
        shell_quote(&app_dir(pipeline_name))
    )
}

fn node_version(config: &ConfigData) -> &str {
    non_empty(&config.version).unwrap_or(DEFAULT_NODE_VERSION)
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}

/// `/dist` -> `/app/dist`, `/` -> `/app`.
fn build_output_path(build_dir: &str) -> String {
    let relative = build_dir.trim().trim_matches('/');
    if relative.is_empty() {
        "/app".to_string()
    } else {
        format!("/app/{relative}")
    }
}

fn static_site_dockerfile(config: &ConfigData) -> String {
    let version = node_version(config);
    let install = non_empty(&config.install_command).unwrap_or("npm install");
    let build_step = non_empty(&config.build_command)
        .map(|build| format!("RUN {build}\n"))
        .unwrap_or_default();
    let output = build_output_path(&config.build_dir);

    format!(
        "FROM node:{version}-alpine AS build\nWORKDIR /app\nCOPY package*.json ./\nRUN {install}\nCOPY . .\n{build_step}\nFROM nginx:alpine\nCOPY nginx.conf /etc/nginx/conf.d/default.conf\nCOPY --from=build {output} /usr/share/nginx/html\nEXPOSE {INTERNAL_PORT}\n"
    )
}

fn node_server_dockerfile(config: &ConfigData) -> String {
    let version = node_version(config);
    let install = non_empty(&config.install_command).unwrap_or("npm install");
    let build_step = non_empty(&config.build_command)
        .map(|build| format!("RUN {build}\n"))
        .unwrap_or_default();
    let run = Value::String(
        non_empty(&config.run_command)
            .unwrap_or("npm start")
            .to_string(),
    );

    format!(
        "FROM node:{version}-alpine\nWORKDIR /app\nCOPY package*.json ./\nRUN {install}\nCOPY . .\n{build_step}ENV PORT={INTERNAL_PORT}\nEXPOSE {INTERNAL_PORT}\nCMD [\"sh\", \"-c\", {run}]\n"
    )
}

fn spa_nginx_conf() -> String {
    format!(
        "server {{\n    listen {INTERNAL_PORT};\n    root /usr/share/nginx/html;\n    index index.html;\n\n    location / {{\n        try_files $uri $uri/ /index.html;\n    }}\n}}\n"
    )
}

#[derive(Serialize)]
struct ComposeFile {
    services: BTreeMap<String, ComposeService>,
}

#[derive(Serialize)]
struct ComposeService {
    build: String,
    restart: String,
    ports: Vec<String>,
    env_file: Vec<String>,
}

fn compose_file(pipeline_name: &str, container_port: u16) -> Result<String> {
    let service = ComposeService {
        build: ".".to_string(),
        restart: "always".to_string(),
        ports: vec![format!(
            "{INTERNAL_INTERFACE}:{INTERNAL_PORT}:{container_port}"
        )],
        env_file: vec![".env".to_string()],
    };
    let compose = ComposeFile {
        services: BTreeMap::from([(pipeline_name.to_string(), service)]),
    };

    serde_yaml::to_string(&compose)
        .map_err(|error| ElestioError::InvalidInput(format!("cannot render compose file: {error}")))
}
