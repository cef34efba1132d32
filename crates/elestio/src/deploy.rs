use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cicd::{CiCdTarget, ProjectScan};
use crate::control_plane::ControlPlane;
use crate::error::{ElestioError, Result};
use crate::git::{self, GitProvider, RepoReference};
use crate::pipeline::{
    self, CreatedPipeline, DeployMode, GitSource, PipelineOverrides, PipelineRequest,
    PipelineSpec, INTERNAL_INTERFACE, INTERNAL_PORT,
};
use crate::remote::{shell_quote, ProcessRunner, SshBridge};

mod artifacts;
mod outcome;


pub use artifacts::{app_dir, artifacts_for, RemoteFileArtifact};
pub use outcome::{DeploymentOutcome, DeploymentStatus, InitWait};

const INIT_CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(60);
const BUILD_TIMEOUT: Duration = Duration::from_secs(20 * 60);
const START_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Waits and poll bounds of the post-submit steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeployTiming {
    /// Pause after a key is newly registered on a target.
    pub key_settle: Duration,
    pub init_poll_attempts: u32,
    pub init_poll_interval: Duration,
    /// Pause between starting the app and probing it.
    pub probe_settle: Duration,
}

impl Default for DeployTiming {
    fn default() -> Self {
        Self {
            key_settle: Duration::from_secs(10),
            init_poll_attempts: 12,
            init_poll_interval: Duration::from_secs(10),
            probe_settle: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ResolvingTarget,
    ResolvingAuth,
    ResolvingOrg,
    ResolvingRepo,
    Submitting,
    EnsuringAccess,
    WaitingForInit,
    WritingArtifacts,
    Building,
    Starting,
    Verifying,
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ResolvingTarget => "resolving target",
            Self::ResolvingAuth => "resolving authorization",
            Self::ResolvingOrg => "resolving organization",
            Self::ResolvingRepo => "resolving repository",
            Self::Submitting => "submitting pipeline",
            Self::EnsuringAccess => "ensuring SSH access",
            Self::WaitingForInit => "waiting for init",
            Self::WritingArtifacts => "writing artifacts",
            Self::Building => "building",
            Self::Starting => "starting",
            Self::Verifying => "verifying",
        };
        formatter.write_str(name)
    }
}

#[derive(Clone, Debug)]
pub struct AutoDeployRequest {
    pub mode: DeployMode,
    pub project_id: String,
    pub vm_id: String,
    pub pipeline_name: String,
    /// `owner/name`; required for git modes.
    pub repository: Option<String>,
    /// Skips the authorization scan when set.
    pub auth_id: Option<String>,
    pub overrides: PipelineOverrides,
}

/// A pipeline the control plane accepted, with what is needed to finish
/// deploying it.
#[derive(Clone, Debug)]
pub struct ProvisionedPipeline {
    pub mode: DeployMode,
    pub target: CiCdTarget,
    pub spec: PipelineSpec,
    pub created: CreatedPipeline,
}

/// Drives one deployment from target lookup to the HTTP probe.
pub struct Deployer {
    api: Arc<dyn ControlPlane>,
    runner: Arc<dyn ProcessRunner>,
    key_path: PathBuf,
    ssh_user: String,
    timing: DeployTiming,
}

impl fmt::Debug for Deployer {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Deployer")
            .field("key_path", &self.key_path)
            .field("ssh_user", &self.ssh_user)
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}

impl Deployer {
    #[must_use]
    pub fn new(
        api: Arc<dyn ControlPlane>,
        runner: Arc<dyn ProcessRunner>,
        key_path: PathBuf,
        ssh_user: &str,
        timing: DeployTiming,
    ) -> Self {
        Self {
            api,
            runner,
            key_path,
            ssh_user: ssh_user.to_string(),
            timing,
        }
    }

    /// Provisions the pipeline, then finishes the deployment over SSH.
    ///
    /// # Errors
    ///
    /// Fails only for problems up to and including pipeline submission.
    /// Later steps degrade the outcome instead.
    pub async fn auto_deploy(&self, request: &AutoDeployRequest) -> Result<DeploymentOutcome> {
        let provisioned = self.provision(request).await?;
        Ok(self.post_deploy(provisioned).await)
    }

    /// Validates the request, resolves the target and git source, and submits
    /// the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the validation, lookup, or submission error that stopped it.
    pub async fn provision(&self, request: &AutoDeployRequest) -> Result<ProvisionedPipeline> {
        let reference = validate_request(request)?;
        let api = self.api.as_ref();
        let mut scan = ProjectScan::new(&request.project_id);

        enter(Stage::ResolvingTarget, &request.pipeline_name);
        let target = scan.find_target(api, &request.vm_id).await?;

        let source = match (request.mode.provider(), reference) {
            (Some(provider), Some(reference)) => {
                Some(self.resolve_source(&mut scan, provider, request, &reference).await?)
            }
            _ => None,
        };

        let spec = pipeline::build_spec(&PipelineRequest {
            mode: request.mode,
            pipeline_name: request.pipeline_name.clone(),
            vm_id: target.vm_id.clone(),
            project_id: request.project_id.clone(),
            source,
            overrides: request.overrides.clone(),
        })?;

        enter(Stage::Submitting, &request.pipeline_name);
        let created = pipeline::create(api, &spec).await?;

        Ok(ProvisionedPipeline {
            mode: request.mode,
            target,
            spec,
            created,
        })
    }

    async fn resolve_source(
        &self,
        scan: &mut ProjectScan,
        provider: GitProvider,
        request: &AutoDeployRequest,
        reference: &RepoReference,
    ) -> Result<GitSource> {
        let api = self.api.as_ref();

        enter(Stage::ResolvingAuth, &request.pipeline_name);
        let explicit = request
            .auth_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);
        let auth_id = match explicit {
            Some(auth_id) => auth_id,
            None => git::find_authorization(api, scan, provider)
                .await?
                .ok_or_else(|| ElestioError::NoAuthFound {
                    provider: provider.to_string(),
                })?,
        };

        enter(Stage::ResolvingOrg, &request.pipeline_name);
        let accounts =
            git::list_organizations(api, &auth_id, provider, &request.project_id).await?;
        let account = git::pick_account(&accounts).map_or_else(
            || reference.owner.clone(),
            |account| account.name.clone(),
        );
        debug!(%account, "listing repositories under account");

        enter(Stage::ResolvingRepo, &request.pipeline_name);
        let repository = git::resolve_repository_in(
            api,
            &auth_id,
            provider,
            &account,
            reference,
            &request.project_id,
        )
        .await?;

        Ok(GitSource {
            repository,
            auth_id,
        })
    }

    /// Registers the SSH key, waits for the target, writes the build files,
    /// builds, starts, and probes the app. Every failure here is recorded as a
    /// warning and ends the sequence with a degraded outcome.
    pub async fn post_deploy(&self, provisioned: ProvisionedPipeline) -> DeploymentOutcome {
        let ProvisionedPipeline {
            mode,
            target,
            spec,
            created,
        } = provisioned;
        let name = spec.pipeline_name.clone();
        let public_url = public_url(&created, &target);

        let mut outcome = DeploymentOutcome {
            status: DeploymentStatus::Degraded,
            pipeline_name: name.clone(),
            pipeline: created,
            target,
            init: InitWait::Skipped,
            probe: None,
            public_url,
            warnings: Vec::new(),
        };

        let Some(address) = outcome.target.reachable_address().map(ToString::to_string) else {
            let cause = format!("target {} has no IPv4 address yet", outcome.target.vm_id);
            degrade(&mut outcome, Stage::EnsuringAccess, &cause);
            return outcome;
        };

        enter(Stage::EnsuringAccess, &name);
        let mut bridge = SshBridge::new(
            Arc::clone(&self.api),
            Arc::clone(&self.runner),
            self.key_path.clone(),
            &self.ssh_user,
            self.timing.key_settle,
        );
        if let Err(error) = bridge.ensure_access(&outcome.target.vm_id).await {
            degrade(&mut outcome, Stage::EnsuringAccess, &error);
            return outcome;
        }

        enter(Stage::WaitingForInit, &name);
        outcome.init = self.wait_for_init(&bridge, &address, mode, &name).await;
        if let InitWait::Unconfirmed { attempts } = outcome.init {
            let message = format!(
                "{} not present after {attempts} checks, continuing",
                mode.init_marker()
            );
            warn!(pipeline = %name, stage = %Stage::WaitingForInit, "{message}");
            outcome
                .warnings
                .push(format!("{}: {message}", Stage::WaitingForInit));
        }

        enter(Stage::WritingArtifacts, &name);
        if let Err(error) = write_artifacts(&bridge, &address, mode, &spec).await {
            degrade(&mut outcome, Stage::WritingArtifacts, &error);
            return outcome;
        }

        enter(Stage::Building, &name);
        let build = artifacts::compose_command(&name, "build");
        if let Err(error) = run_logged(&bridge, &address, &build, BUILD_TIMEOUT).await {
            degrade(&mut outcome, Stage::Building, &error);
            return outcome;
        }

        enter(Stage::Starting, &name);
        let start = artifacts::compose_command(&name, "up -d");
        if let Err(error) = run_logged(&bridge, &address, &start, START_TIMEOUT).await {
            degrade(&mut outcome, Stage::Starting, &error);
            return outcome;
        }

        enter(Stage::Verifying, &name);
        match self.probe(&bridge, &address).await {
            Ok(200) => {
                outcome.probe = Some(200);
                outcome.status = DeploymentStatus::Succeeded;
                info!(pipeline = %name, url = ?outcome.public_url, "deployment verified");
            }
            Ok(code) => {
                outcome.probe = Some(code);
                degrade(
                    &mut outcome,
                    Stage::Verifying,
                    &format!("app answered HTTP {code}, expected 200"),
                );
            }
            Err(error) => degrade(&mut outcome, Stage::Verifying, &error),
        }

        outcome
    }

    async fn wait_for_init(
        &self,
        bridge: &SshBridge,
        address: &str,
        mode: DeployMode,
        name: &str,
    ) -> InitWait {
        let marker = format!("{}/{}", app_dir(name), mode.init_marker());
        let command = format!("test -e {}", shell_quote(&marker));
        let attempts = self.timing.init_poll_attempts.max(1);

        for attempt in 1..=attempts {
            match bridge.execute(address, &command, INIT_CHECK_TIMEOUT).await {
                Ok(_) => {
                    debug!(pipeline = name, attempt, "target finished init");
                    return InitWait::Confirmed { attempts: attempt };
                }
                Err(error) => debug!(pipeline = name, attempt, %error, "init not confirmed yet"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.timing.init_poll_interval).await;
            }
        }

        InitWait::Unconfirmed { attempts }
    }

    async fn probe(&self, bridge: &SshBridge, address: &str) -> Result<u16> {
        if !self.timing.probe_settle.is_zero() {
            tokio::time::sleep(self.timing.probe_settle).await;
        }

        let command = format!(
            "curl -s -o /dev/null -w '%{{http_code}}' http://{INTERNAL_INTERFACE}:{INTERNAL_PORT}/ || true"
        );
        let stdout = bridge.execute(address, &command, PROBE_TIMEOUT).await?;
        let code = stdout.trim();
        code.parse::<u16>().map_err(|_| {
            ElestioError::remote_exec(command, format!("unexpected probe output '{code}'"))
        })
    }
}

/// Checks everything that can be checked without a remote call.
fn validate_request(request: &AutoDeployRequest) -> Result<Option<RepoReference>> {
    if request.project_id.trim().is_empty() {
        return Err(ElestioError::MissingConfig("project id"));
    }
    if request.vm_id.trim().is_empty() {
        return Err(ElestioError::InvalidInput("target vm id is empty".to_string()));
    }
    pipeline::validate_pipeline_name(&request.pipeline_name)?;
    if let Some(branch) = request
        .overrides
        .branch
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        pipeline::validate_branch(branch)?;
    }

    let repository = request
        .repository
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match (request.mode.provider(), repository) {
        (Some(_), Some(repository)) => RepoReference::parse(repository).map(Some),
        (Some(_), None) => Err(ElestioError::InvalidInput(format!(
            "{} mode requires --repo owner/name",
            request.mode
        ))),
        (None, Some(_)) => Err(ElestioError::InvalidInput(
            "docker mode creates its own repository and does not take --repo".to_string(),
        )),
        (None, None) => Ok(None),
    }
}

fn enter(stage: Stage, pipeline_name: &str) {
    info!(pipeline = pipeline_name, %stage, "auto-deploy stage");
}

fn degrade(outcome: &mut DeploymentOutcome, stage: Stage, cause: &dyn fmt::Display) {
    warn!(pipeline = %outcome.pipeline_name, %stage, %cause, "deployment degraded");
    outcome.status = DeploymentStatus::Degraded;
    outcome.warnings.push(format!("{stage}: {cause}"));
}

fn public_url(created: &CreatedPipeline, target: &CiCdTarget) -> Option<String> {
    let from_response = created
        .url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|url| {
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            }
        });

    from_response.or_else(|| {
        target
            .cname
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|cname| format!("https://{cname}"))
    })
}

async fn write_artifacts(
    bridge: &SshBridge,
    address: &str,
    mode: DeployMode,
    spec: &PipelineSpec,
) -> Result<()> {
    let files = artifacts_for(mode, &spec.pipeline_name, &spec.config)?;
    for file in &files {
        debug!(path = %file.path, bytes = file.contents.len(), "writing artifact");
        bridge
            .write_file(address, &file.path, &file.contents, WRITE_TIMEOUT)
            .await?;
    }
    bridge
        .execute(
            address,
            &artifacts::touch_env_command(&spec.pipeline_name),
            WRITE_TIMEOUT,
        )
        .await?;
    Ok(())
}

async fn run_logged(
    bridge: &SshBridge,
    address: &str,
    command: &str,
    timeout: Duration,
) -> Result<()> {
    let output = bridge.execute(address, command, timeout).await?;
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        debug!(target: "elestio::remote_output", "{line}");
    }
    info!(command, lines = output.lines().count(), "remote command finished");
    Ok(())
}
