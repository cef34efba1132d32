use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ElestioError;
use crate::git::GitProvider;

/// What kind of application a pipeline runs, which decides the generated
/// Dockerfile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppKind {
    /// Built with Node and served by Nginx.
    StaticSite,
    NodeServer,
    /// Brings its own Dockerfile.
    Docker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CicdMode {
    GitHub,
    GitLab,
    Docker,
}

impl CicdMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "GITHUB",
            Self::GitLab => "GITLAB",
            Self::Docker => "DOCKER",
        }
    }
}

impl Serialize for CicdMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployMode {
    GitHub,
    GitHubFullstack,
    GitLab,
    GitLabFullstack,
    Docker,
}

/// Build and runtime defaults of one mode family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeDefaults {
    pub runtime: &'static str,
    pub build_dir: &'static str,
    pub build_command: &'static str,
    pub run_command: &'static str,
    pub install_command: &'static str,
    pub container_port: u16,
}

const STATIC_DEFAULTS: ModeDefaults = ModeDefaults {
    runtime: "staticSPA",
    build_dir: "/dist",
    build_command: "npm run build",
    run_command: "",
    install_command: "npm install",
    container_port: 3000,
};

const FULLSTACK_DEFAULTS: ModeDefaults = ModeDefaults {
    runtime: "node",
    build_dir: "/",
    build_command: "npm run build",
    run_command: "npm start",
    install_command: "npm install",
    container_port: 3000,
};

const DOCKER_DEFAULTS: ModeDefaults = ModeDefaults {
    runtime: "",
    build_dir: "/",
    build_command: "",
    run_command: "",
    install_command: "",
    container_port: 80,
};

impl DeployMode {
    pub const ALL: [Self; 5] = [
        Self::GitHub,
        Self::GitHubFullstack,
        Self::GitLab,
        Self::GitLabFullstack,
        Self::Docker,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitHubFullstack => "github-fullstack",
            Self::GitLab => "gitlab",
            Self::GitLabFullstack => "gitlab-fullstack",
            Self::Docker => "docker",
        }
    }

    /// `None` for docker mode, which is not bound to an existing repository.
    #[must_use]
    pub const fn provider(self) -> Option<GitProvider> {
        match self {
            Self::GitHub | Self::GitHubFullstack => Some(GitProvider::GitHub),
            Self::GitLab | Self::GitLabFullstack => Some(GitProvider::GitLab),
            Self::Docker => None,
        }
    }

    #[must_use]
    pub const fn cicd_mode(self) -> CicdMode {
        match self {
            Self::GitHub | Self::GitHubFullstack => CicdMode::GitHub,
            Self::GitLab | Self::GitLabFullstack => CicdMode::GitLab,
            Self::Docker => CicdMode::Docker,
        }
    }

    #[must_use]
    pub const fn app_kind(self) -> AppKind {
        match self {
            Self::GitHub | Self::GitLab => AppKind::StaticSite,
            Self::GitHubFullstack | Self::GitLabFullstack => AppKind::NodeServer,
            Self::Docker => AppKind::Docker,
        }
    }

    #[must_use]
    pub const fn defaults(self) -> ModeDefaults {
        match self.app_kind() {
            AppKind::StaticSite => STATIC_DEFAULTS,
            AppKind::NodeServer => FULLSTACK_DEFAULTS,
            AppKind::Docker => DOCKER_DEFAULTS,
        }
    }

    /// File whose presence under the app directory shows the target has
    /// finished checking out the pipeline's source.
    #[must_use]
    pub const fn init_marker(self) -> &'static str {
        match self.app_kind() {
            AppKind::StaticSite | AppKind::NodeServer => "package.json",
            AppKind::Docker => "Dockerfile",
        }
    }
}

impl Serialize for DeployMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = ElestioError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| {
                ElestioError::InvalidInput(format!(
                    "unknown deploy mode '{value}', expected one of: {}",
                    Self::ALL.map(Self::as_str).join(", ")
                ))
            })
    }
}
