use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cicd::api_types::flexible_optional_string;
use crate::cicd::ProjectScan;
use crate::control_plane::{ControlPlane, Endpoint, Method, RemoteList};
use crate::error::{ElestioError, Result};

#[cfg(test)]
mod tests;

/// Third-party git hosting platform a pipeline's source is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GitProvider {
    GitHub,
    GitLab,
}

impl GitProvider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "GITHUB",
            Self::GitLab => "GITLAB",
        }
    }

    #[must_use]
    pub const fn host(self) -> &'static str {
        match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
        }
    }

    #[must_use]
    pub fn matches(self, recorded_kind: &str) -> bool {
        recorded_kind.trim().eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for GitProvider {
    type Err = ElestioError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            other => Err(ElestioError::InvalidInput(format!(
                "unknown git provider '{other}', expected github or gitlab"
            ))),
        }
    }
}

impl Serialize for GitProvider {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// An organization or user account visible through an authorization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GitAccount {
    pub name: String,
}

impl<'de> Deserialize<'de> for GitAccount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let name = match &value {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => ["login", "username", "path", "name"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(ToString::to_string),
            _ => None,
        };

        name.map(|name| Self { name })
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized git account: {value}")))
    }
}

/// A source repository visible under an authorization, normalized across
/// the GitHub and GitLab listing shapes.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "RepositoryWire")]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub owner: String,
    pub clone_url: Option<String>,
    pub default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryWire {
    #[serde(default, deserialize_with = "flexible_optional_string")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    path_with_namespace: Option<String>,
    #[serde(default)]
    owner: Option<RepositoryOwner>,
    #[serde(default)]
    namespace: Option<RepositoryNamespace>,
    #[serde(default)]
    clone_url: Option<String>,
    #[serde(default)]
    http_url_to_repo: Option<String>,
    #[serde(default)]
    default_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepositoryNamespace {
    path: String,
}

impl From<RepositoryWire> for Repository {
    fn from(wire: RepositoryWire) -> Self {
        let owner_hint = wire
            .owner
            .map(|owner| owner.login)
            .or_else(|| wire.namespace.map(|namespace| namespace.path));
        let full_name = wire
            .full_name
            .or(wire.path_with_namespace)
            .or_else(|| owner_hint.as_ref().map(|owner| format!("{owner}/{}", wire.name)))
            .unwrap_or_else(|| wire.name.clone());
        let owner = owner_hint.unwrap_or_else(|| {
            full_name
                .split_once('/')
                .map(|(owner, _)| owner.to_string())
                .unwrap_or_default()
        });

        Self {
            id: wire.id.unwrap_or_default(),
            name: wire.name,
            full_name,
            owner,
            clone_url: wire.clone_url.or(wire.http_url_to_repo),
            default_branch: wire.default_branch,
        }
    }
}

/// Validated `owner/name` input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoReference {
    pub owner: String,
    pub name: String,
}

impl RepoReference {
    /// # Errors
    ///
    /// Returns [`ElestioError::InvalidRepoFormat`] unless the input has
    /// exactly two non-empty `/`-separated segments.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let segments = trimmed.split('/').collect::<Vec<_>>();
        match segments.as_slice() {
            [owner, name] if !owner.trim().is_empty() && !name.trim().is_empty() => Ok(Self {
                owner: owner.trim().to_string(),
                name: name.trim().to_string(),
            }),
            _ => Err(ElestioError::InvalidRepoFormat(input.to_string())),
        }
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Scans every target of the project and every pipeline on it for one
/// recorded against `provider` with a usable authorization id.
///
/// Costs one listing call for the targets plus one per target not already
/// in `scan`. First match wins; `None` means no pipeline carries one.
///
/// # Errors
///
/// Propagates failures listing the project's targets. Per-target pipeline
/// listing failures are skipped.
pub async fn find_authorization(
    api: &dyn ControlPlane,
    scan: &mut ProjectScan,
    provider: GitProvider,
) -> Result<Option<String>> {
    let vm_ids = scan
        .targets(api)
        .await?
        .iter()
        .map(|target| target.vm_id.clone())
        .collect::<Vec<_>>();

    for vm_id in vm_ids {
        let found = scan
            .pipelines(api, &vm_id)
            .await
            .iter()
            .filter(|pipeline| pipeline.provider_kind().is_some_and(|kind| provider.matches(kind)))
            .find_map(|pipeline| pipeline.usable_auth_id().map(ToString::to_string));

        if let Some(auth_id) = found {
            info!(%provider, %vm_id, %auth_id, "found existing git authorization");
            return Ok(Some(auth_id));
        }
    }

    debug!(%provider, project_id = scan.project_id(), "no git authorization recorded");
    Ok(None)
}

/// # Errors
///
/// Fails when the authorization is invalid or the call fails.
pub async fn list_organizations(
    api: &dyn ControlPlane,
    auth_id: &str,
    provider: GitProvider,
    project_id: &str,
) -> Result<Vec<GitAccount>> {
    let value = api
        .call(
            Endpoint::ListGitOrganizations,
            Method::Post,
            json!({ "authID": auth_id, "gitType": provider, "projectId": project_id }),
        )
        .await?;
    RemoteList::from_value(Endpoint::ListGitOrganizations.name(), value)
}

/// # Errors
///
/// Propagates control-plane failures.
pub async fn list_repositories(
    api: &dyn ControlPlane,
    auth_id: &str,
    provider: GitProvider,
    account: &str,
    project_id: &str,
) -> Result<Vec<Repository>> {
    let value = api
        .call(
            Endpoint::ListGitRepositories,
            Method::Post,
            json!({
                "authID": auth_id,
                "gitType": provider,
                "account": account,
                "projectId": project_id
            }),
        )
        .await?;
    RemoteList::from_value(Endpoint::ListGitRepositories.name(), value)
}

/// Resolves `owner/name` against the repositories listed under `owner`.
///
/// # Errors
///
/// [`ElestioError::InvalidRepoFormat`] before any call for malformed input,
/// [`ElestioError::RepoNotFound`] with the visible names otherwise.
pub async fn resolve_repository(
    api: &dyn ControlPlane,
    auth_id: &str,
    provider: GitProvider,
    repo: &str,
    project_id: &str,
) -> Result<Repository> {
    let reference = RepoReference::parse(repo)?;
    resolve_repository_in(api, auth_id, provider, &reference.owner, &reference, project_id).await
}

/// Like [`resolve_repository`], listing under an explicit account.
///
/// # Errors
///
/// [`ElestioError::RepoNotFound`] when nothing matches.
pub async fn resolve_repository_in(
    api: &dyn ControlPlane,
    auth_id: &str,
    provider: GitProvider,
    account: &str,
    reference: &RepoReference,
    project_id: &str,
) -> Result<Repository> {
    let repositories = list_repositories(api, auth_id, provider, account, project_id).await?;
    match_repository(repositories, reference)
}

/// Exact `owner/name` match first, then a case-insensitive match on the
/// bare name.
///
/// # Errors
///
/// [`ElestioError::RepoNotFound`] listing every candidate's full name.
pub fn match_repository(
    mut repositories: Vec<Repository>,
    reference: &RepoReference,
) -> Result<Repository> {
    let wanted = reference.full_name();
    let exact = repositories
        .iter()
        .position(|repository| repository.full_name.eq_ignore_ascii_case(&wanted));
    let matched = exact.or_else(|| {
        repositories
            .iter()
            .position(|repository| repository.name.eq_ignore_ascii_case(&reference.name))
    });
    if let Some(index) = matched {
        return Ok(repositories.swap_remove(index));
    }

    Err(ElestioError::RepoNotFound {
        repo: wanted,
        available: repositories
            .into_iter()
            .map(|repository| repository.full_name)
            .collect(),
    })
}

/// The account repositories are listed under: the first one returned.
#[must_use]
pub fn pick_account(accounts: &[GitAccount]) -> Option<&GitAccount> {
    accounts.first()
}
