use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use elestio::cicd::ProjectScan;
use elestio::config::ElestioConfig;
use elestio::control_plane::HttpControlPlane;
use elestio::deploy::{AutoDeployRequest, DeploymentOutcome, Deployer};
use elestio::git::{self, GitProvider};
use elestio::pipeline::{DeployMode, PipelineOverrides};
use elestio::remote::{SshBridge, TokioProcessRunner};
use elestio::ElestioError;

#[derive(Debug, Parser)]
#[command(name = "elestio")]
#[command(about = "Provision Elestio CI/CD pipelines and finish their deployment")]
struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Overrides the configured project id.
    #[arg(long, global = true)]
    project_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a pipeline and deploy it end to end.
    AutoDeploy(DeployArgs),
    #[command(subcommand)]
    Pipeline(PipelineCommand),
    #[command(subcommand)]
    Git(GitCommand),
    #[command(subcommand)]
    Ssh(SshCommand),
}

#[derive(Debug, Subcommand)]
enum PipelineCommand {
    /// Submit a pipeline without the SSH follow-up steps.
    Create(DeployArgs),
}

#[derive(Debug, Subcommand)]
enum GitCommand {
    /// Find an authorization already used by a pipeline in the project.
    Auth {
        #[arg(long)]
        provider: GitProvider,
    },
    Orgs {
        #[arg(long)]
        provider: GitProvider,
        #[arg(long)]
        auth_id: String,
    },
    Repos {
        #[arg(long)]
        provider: GitProvider,
        #[arg(long)]
        auth_id: String,
        #[arg(long)]
        account: String,
    },
    /// Resolve `owner/name` to a repository visible to the authorization.
    Resolve {
        #[arg(long)]
        provider: GitProvider,
        #[arg(long)]
        auth_id: String,
        #[arg(long)]
        repo: String,
    },
}

#[derive(Debug, Subcommand)]
enum SshCommand {
    /// Make sure the local key is authorized on the target.
    Ensure {
        #[arg(long)]
        vm_id: String,
    },
    Exec {
        #[arg(long)]
        vm_id: String,
        #[arg(long, default_value_t = 60)]
        timeout_seconds: u64,
        command: String,
    },
}

#[derive(Debug, Args)]
struct DeployArgs {
    /// github, github-fullstack, gitlab, gitlab-fullstack or docker.
    #[arg(long)]
    mode: DeployMode,
    #[arg(long)]
    vm_id: String,
    #[arg(long)]
    name: String,
    /// Repository as owner/name, for git modes.
    #[arg(long)]
    repo: Option<String>,
    #[arg(long)]
    auth_id: Option<String>,
    #[command(flatten)]
    overrides: OverrideArgs,
}

#[derive(Debug, Args)]
struct OverrideArgs {
    #[arg(long)]
    branch: Option<String>,
    #[arg(long)]
    build_command: Option<String>,
    #[arg(long)]
    run_command: Option<String>,
    #[arg(long)]
    install_command: Option<String>,
    #[arg(long)]
    build_dir: Option<String>,
    #[arg(long)]
    framework: Option<String>,
    #[arg(long)]
    node_version: Option<String>,
}

impl From<OverrideArgs> for PipelineOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            branch: args.branch,
            build_command: args.build_command,
            run_command: args.run_command,
            install_command: args.install_command,
            build_dir: args.build_dir,
            framework: args.framework,
            version: args.node_version,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the command; `Ok(false)` means it finished but the deployment is
/// degraded.
async fn run(cli: Cli) -> Result<bool> {
    let config = ElestioConfig::load()?;
    let session = Session::open(&config, cli.project_id.as_deref())?;
    let json = cli.json;

    match cli.command {
        Command::AutoDeploy(args) => {
            let outcome = session
                .deployer(&config)
                .auto_deploy(&session.request(args))
                .await?;
            print_outcome(&outcome, json)?;
            return Ok(outcome.succeeded());
        }
        Command::Pipeline(PipelineCommand::Create(args)) => {
            let provisioned = session
                .deployer(&config)
                .provision(&session.request(args))
                .await?;
            if json {
                print_json(&provisioned.created)?;
            } else {
                println!("Pipeline: {}", provisioned.spec.pipeline_name);
                println!(
                    "Pipeline id: {}",
                    provisioned.created.pipeline_id.as_deref().unwrap_or("(not reported)")
                );
                if let Some(message) = &provisioned.created.message {
                    println!("Message: {message}");
                }
            }
        }
        Command::Git(command) => run_git(&session, command, json).await?,
        Command::Ssh(command) => run_ssh(&session, &config, command, json).await?,
    }

    Ok(true)
}

async fn run_git(session: &Session, command: GitCommand, json: bool) -> Result<()> {
    let api = session.api.as_ref();
    let project_id = session.project_id.as_str();

    match command {
        GitCommand::Auth { provider } => {
            let mut scan = ProjectScan::new(project_id);
            let auth_id = git::find_authorization(api, &mut scan, provider)
                .await?
                .ok_or_else(|| ElestioError::NoAuthFound {
                    provider: provider.to_string(),
                })?;
            if json {
                print_json(&serde_json::json!({ "provider": provider, "authId": auth_id }))?;
            } else {
                println!("{provider} authorization: {auth_id}");
            }
        }
        GitCommand::Orgs { provider, auth_id } => {
            let accounts = git::list_organizations(api, &auth_id, provider, project_id).await?;
            if json {
                print_json(&accounts)?;
            } else {
                for account in accounts {
                    println!("{}", account.name);
                }
            }
        }
        GitCommand::Repos {
            provider,
            auth_id,
            account,
        } => {
            let repositories =
                git::list_repositories(api, &auth_id, provider, &account, project_id).await?;
            if json {
                print_json(&repositories)?;
            } else {
                for repository in repositories {
                    println!("{}", repository.full_name);
                }
            }
        }
        GitCommand::Resolve {
            provider,
            auth_id,
            repo,
        } => {
            let repository =
                git::resolve_repository(api, &auth_id, provider, &repo, project_id).await?;
            if json {
                print_json(&repository)?;
            } else {
                println!("{} (id {})", repository.full_name, repository.id);
            }
        }
    }

    Ok(())
}

async fn run_ssh(
    session: &Session,
    config: &ElestioConfig,
    command: SshCommand,
    json: bool,
) -> Result<()> {
    let mut bridge = SshBridge::new(
        session.api.clone(),
        Arc::new(TokioProcessRunner),
        config.ssh_key_path(),
        &config.ssh_user(),
        config.deploy_timing().key_settle,
    );

    match command {
        SshCommand::Ensure { vm_id } => {
            let key_path = bridge.ensure_access(&vm_id).await?;
            if json {
                print_json(&serde_json::json!({ "vmId": vm_id, "keyPath": key_path }))?;
            } else {
                println!("SSH key {} authorized on {vm_id}", key_path.display());
            }
        }
        SshCommand::Exec {
            vm_id,
            timeout_seconds,
            command,
        } => {
            let mut scan = ProjectScan::new(&session.project_id);
            let target = scan.find_target(session.api.as_ref(), &vm_id).await?;
            let address = target
                .reachable_address()
                .with_context(|| format!("target {vm_id} has no IPv4 address"))?
                .to_string();
            bridge.ensure_access(&vm_id).await?;
            let stdout = bridge
                .execute(&address, &command, Duration::from_secs(timeout_seconds))
                .await?;
            print!("{stdout}");
        }
    }

    Ok(())
}

/// Control-plane client and project scope shared by every command.
struct Session {
    api: Arc<HttpControlPlane>,
    project_id: String,
}

impl Session {
    fn open(config: &ElestioConfig, project_id_override: Option<&str>) -> Result<Self> {
        let email = config.email().ok_or(ElestioError::MissingConfig("email"))?;
        let api_token = config
            .api_token()
            .ok_or(ElestioError::MissingConfig("API token"))?;
        let project_id = project_id_override
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
            .or_else(|| config.project_id())
            .ok_or(ElestioError::MissingConfig("project id"))?;

        Ok(Self {
            api: Arc::new(HttpControlPlane::new(&config.api_url(), &email, &api_token)),
            project_id,
        })
    }

    fn deployer(&self, config: &ElestioConfig) -> Deployer {
        Deployer::new(
            self.api.clone(),
            Arc::new(TokioProcessRunner),
            config.ssh_key_path(),
            &config.ssh_user(),
            config.deploy_timing(),
        )
    }

    fn request(&self, args: DeployArgs) -> AutoDeployRequest {
        AutoDeployRequest {
            mode: args.mode,
            project_id: self.project_id.clone(),
            vm_id: args.vm_id,
            pipeline_name: args.name,
            repository: args.repo,
            auth_id: args.auth_id,
            overrides: args.overrides.into(),
        }
    }
}

fn print_outcome(outcome: &DeploymentOutcome, json: bool) -> Result<()> {
    if json {
        return print_json(outcome);
    }

    println!("Pipeline: {}", outcome.pipeline_name);
    println!("Target: {} ({})", outcome.target.display_name, outcome.target.vm_id);
    println!("Status: {:?}", outcome.status);
    if let Some(code) = outcome.probe {
        println!("Probe: HTTP {code}");
    }
    if let Some(url) = &outcome.public_url {
        println!("URL: {url}");
    }
    for warning in &outcome.warnings {
        println!("Warning: {warning}");
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
