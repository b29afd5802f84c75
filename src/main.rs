#![forbid(unsafe_code)]

//! `agent-vault`: vault orchestrator, claim agent, replication and
//! watchdog entry points.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_vault::adapters::AdapterSet;
use agent_vault::claim::ClaimProtocol;
use agent_vault::journal::{DailyJsonJournal, Journal};
use agent_vault::orchestrator::{run_orchestrator, ClaimAgent};
use agent_vault::router::Router;
use agent_vault::scheduler::briefing::write_daily_briefing;
use agent_vault::signals::merge_signals;
use agent_vault::store::{SeenIds, Stage, TaskStore};
use agent_vault::sync::VaultSync;
use agent_vault::watchdog::Watchdog;
use agent_vault::watchers::{drive, seen_path, InboxWatcher};
use agent_vault::{AgentMode, AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "agent-vault",
    about = "Shared-filesystem task coordination for automation agents",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Vault root; overrides the config file and `VAULT_PATH`.
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    /// Log intended mutations and external calls without performing them.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Agent class.
    #[arg(long, global = true, value_enum)]
    agent_mode: Option<AgentMode>,

    /// Agent name (`In_Progress/<name>`).
    #[arg(long, global = true)]
    agent_name: Option<String>,

    /// Log output format (text or json).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Route human decisions as they land and run the scheduled jobs.
    Orchestrate,
    /// Claim and route tasks from `Needs_Action`.
    Agent {
        /// Run a single pass and exit.
        #[arg(long)]
        once: bool,
    },
    /// Route one file from `Approved` or `Rejected`.
    Route {
        /// Path to, or name of, the decided task file.
        file: PathBuf,
    },
    /// Claim and route one `Needs_Action` file.
    Claim {
        /// Task filename.
        name: String,
    },
    /// Replicate the vault over git.
    Sync {
        /// Run one pull-and-push cycle and exit.
        #[arg(long, conflicts_with_all = ["pull_only", "push"])]
        once: bool,
        /// Pull once and exit.
        #[arg(long, conflicts_with = "push")]
        pull_only: bool,
        /// Commit with this message, push once and exit.
        #[arg(long, value_name = "MSG")]
        push: Option<String>,
    },
    /// Supervise the worker processes.
    Watchdog,
    /// Turn files dropped into `Inbox` into tasks.
    WatchInbox,
    /// Merge cloud signals into the dashboard.
    MergeSignals,
    /// Write today's briefing.
    Briefing {
        /// Rewrite an existing briefing.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(args)) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Everything a subcommand needs, built once from configuration.
struct Context {
    config: GlobalConfig,
    config_path: Option<PathBuf>,
    store: TaskStore,
    journal: Arc<DailyJsonJournal>,
}

impl Context {
    fn shared_journal(&self) -> Arc<dyn Journal> {
        Arc::clone(&self.journal) as Arc<dyn Journal>
    }

    fn router(&self) -> Router {
        let adapters = AdapterSet::from_config(&self.config.adapters, self.config.vault_root());
        Router::new(
            self.store.clone(),
            self.shared_journal(),
            Arc::new(adapters),
            self.config.resilience.clone(),
            self.config.mode(),
            self.config.agent_name(),
        )
    }

    fn claim_agent(&self) -> ClaimAgent {
        let protocol = ClaimProtocol::new(
            self.store.clone(),
            self.config.agent_name(),
            self.shared_journal(),
        );
        ClaimAgent::new(
            protocol,
            self.router(),
            self.shared_journal(),
            self.config.poll_interval(),
            std::time::Duration::from_secs(self.config.agent.status_interval_seconds),
        )
    }
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .map_err(|err| {
                    AppError::Config(format!("cannot read config {}: {err}", path.display()))
                })?;
            GlobalConfig::parse_toml(&raw)?
        }
        None => GlobalConfig::default(),
    };
    config.apply_env();
    if let Some(vault) = &args.vault {
        config.vault_root.clone_from(vault);
    }
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(mode) = args.agent_mode {
        config.agent.mode = mode;
    }
    if let Some(name) = &args.agent_name {
        config.agent.name = Some(name.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = load_config(&args)?;
    let store = TaskStore::new(config.vault_root().to_owned(), config.dry_run);
    store.ensure_layout(&[config.agent_name().as_str()])?;
    let journal = Arc::new(DailyJsonJournal::new(store.logs_dir(), config.dry_run)?);
    info!(
        vault = %config.vault_root().display(),
        agent = %config.agent_name(),
        mode = config.mode().as_str(),
        dry_run = config.dry_run,
        "configuration loaded"
    );
    let ctx = Context {
        config,
        config_path: args.config.clone(),
        store,
        journal,
    };

    match args.command {
        Command::Orchestrate => {
            let cancel = cancel_on_signal();
            run_orchestrator(
                &ctx.config,
                ctx.store.clone(),
                Arc::clone(&ctx.journal),
                ctx.router(),
                cancel,
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Agent { once: true } => {
            let report = ctx.claim_agent().run_once().await?;
            Ok(exit_code(report.all_succeeded()))
        }
        Command::Agent { once: false } => {
            ctx.claim_agent().run(cancel_on_signal()).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::Route { file } => route_one(&ctx, &file).await,
        Command::Claim { name } => {
            let outcome = ctx.claim_agent().claim_one(&name).await?;
            match outcome {
                Some(outcome) => {
                    info!(
                        file = outcome.name,
                        kind = %outcome.kind,
                        disposition = ?outcome.disposition,
                        "task routed"
                    );
                    Ok(exit_code(outcome.is_success()))
                }
                None => {
                    warn!(file = name, "task not claimed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Sync {
            once,
            pull_only,
            push,
        } => {
            let sync = VaultSync::from_config(&ctx.config, ctx.store.clone(), ctx.shared_journal());
            let result = if once {
                sync.sync_once().await
            } else if pull_only {
                sync.pull().await
            } else if let Some(message) = push {
                sync.push(&message).await
            } else {
                sync.run(cancel_on_signal()).await;
                return Ok(ExitCode::SUCCESS);
            };
            match result {
                Ok(report) => {
                    info!(?report, "sync finished");
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    error!(%err, "sync failed");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Watchdog => {
            let watchdog = Watchdog::from_config(
                &ctx.config,
                ctx.config_path.as_deref(),
                ctx.shared_journal(),
            )?;
            watchdog.run(cancel_on_signal()).await;
            Ok(ExitCode::SUCCESS)
        }
        Command::WatchInbox => {
            let seen = SeenIds::load(
                seen_path(&ctx.store, "inbox"),
                ctx.config.watchers.seen_ids_limit,
                ctx.config.dry_run,
            );
            let source = InboxWatcher::new(ctx.store.inbox_dir());
            drive(
                source,
                ctx.store.clone(),
                seen,
                ctx.journal.as_ref(),
                std::time::Duration::from_secs(ctx.config.watchers.inbox_poll_seconds),
                cancel_on_signal(),
            )
            .await;
            Ok(ExitCode::SUCCESS)
        }
        Command::MergeSignals => {
            let report = merge_signals(&ctx.store, ctx.journal.as_ref(), &ctx.config.agent_name())?;
            info!(merged = report.merged, archived = report.archived, "merge finished");
            Ok(ExitCode::SUCCESS)
        }
        Command::Briefing { force } => {
            match write_daily_briefing(&ctx.store, &ctx.journal, &ctx.config.agent_name(), force)? {
                Some(path) => info!(path = %path.display(), "briefing written"),
                None => info!("today's briefing already exists"),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Route one decided file given as a path or a bare name.
async fn route_one(ctx: &Context, file: &Path) -> Result<ExitCode> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::Config(format!("invalid task path {}", file.display())))?
        .to_owned();
    let parent = file
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str());
    let stage = match parent {
        Some(agent_vault::store::APPROVED) => Stage::Approved,
        Some(agent_vault::store::REJECTED) => Stage::Rejected,
        _ if ctx.store.path_of(&Stage::Approved, &name).is_file() => Stage::Approved,
        _ if ctx.store.path_of(&Stage::Rejected, &name).is_file() => Stage::Rejected,
        _ => {
            error!(file = name, "task is not in Approved or Rejected");
            return Ok(ExitCode::FAILURE);
        }
    };
    let mut router = ctx.router();
    let outcome = router.route_decided(&stage, &name).await?;
    info!(
        file = outcome.name,
        kind = %outcome.kind,
        disposition = ?outcome.disposition,
        "task routed"
    );
    Ok(exit_code(outcome.is_success()))
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Token cancelled on Ctrl-C or SIGTERM.
fn cancel_on_signal() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        trigger.cancel();
    });
    cancel
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
