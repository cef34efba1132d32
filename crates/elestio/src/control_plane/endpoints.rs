use std::fmt;

pub(super) const LOGIN_PATH: &str = "/api/auth/checkAPIToken";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListTargets,
    ListPipelines,
    ListGitOrganizations,
    ListGitRepositories,
    CreatePipeline,
    ServerAction,
}

impl Endpoint {
    /// Logical name used in logs and error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListTargets => "cicd.list_targets",
            Self::ListPipelines => "cicd.list_pipelines",
            Self::ListGitOrganizations => "cicd.list_git_organizations",
            Self::ListGitRepositories => "cicd.list_git_repositories",
            Self::CreatePipeline => "cicd.create_pipeline",
            Self::ServerAction => "servers.action",
        }
    }

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::ListTargets => "/api/cicd/getTargets",
            Self::ListPipelines => "/api/cicd/getPipelines",
            Self::ListGitOrganizations => "/api/cicd/getGitOrganizations",
            Self::ListGitRepositories => "/api/cicd/getGitRepositories",
            Self::CreatePipeline => "/api/cicd/createAutoDeployPipeline",
            Self::ServerAction => "/api/servers/DoActionOnServer",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}
