use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use codegate_core::{
    config::Config,
    eligibility::{EligibilityReport, GroupOutcome},
    logging::{init_logging_with_config, LogConfig},
    metrics::init_metrics,
    oracle::{BotApiOracle, MembershipOracle, OracleError, OracleResult},
    ArtifactRef, DeliveryOutcome, FetchOutcome, GateService, GroupId, MemberStatus,
    MembershipEvent, MirrorCleanup, MirrorLocator, NewContent, RegisterOutcome, SqlStore, UserId,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "codegate")]
#[command(author, version, about = "Access-gated content registry", long_about = None)]
struct Args {
    /// TOML configuration file; CODEGATE_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overrides the configured path
    #[arg(long)]
    db: Option<String>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the effective configuration to a file
    InitConfig { path: PathBuf },

    /// Manage gating groups
    #[command(subcommand)]
    Groups(GroupsCommand),

    /// Manage content
    #[command(subcommand)]
    Content(ContentCommand),

    /// Show whether a user may receive content
    Check {
        #[arg(allow_negative_numbers = true)]
        user_id: i64,
    },

    /// Look up content on behalf of a user
    Fetch { user_id: i64, code: String },

    /// Send content to a chat on behalf of a user
    Deliver {
        user_id: i64,
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        code: String,
    },

    /// Apply membership events, one JSON object per line on stdin
    Events,
}

#[derive(Subcommand, Debug)]
enum GroupsCommand {
    /// Register a gating group (probes the platform first)
    Add {
        #[arg(allow_negative_numbers = true)]
        group_id: i64,
        reference: String,
    },
    List,
    Rename { old: String, new: String },
    Remove { reference: String },
}

#[derive(Subcommand, Debug)]
enum ContentCommand {
    /// Register content (mirrored when a storage group is configured)
    Register {
        #[arg(long)]
        code: String,
        /// Platform file id of the artifact
        #[arg(long)]
        artifact: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Show { code: String },
    List,
    /// Remove content and its mirrored copy
    Remove { code: String },
}

/// Stand-in used when no bot token is configured
///
/// Every call fails, so eligibility relies on pending requests alone.
struct Offline;

#[async_trait]
impl MembershipOracle for Offline {
    async fn member_status(&self, _: GroupId, _: UserId) -> OracleResult<MemberStatus> {
        Err(OracleError::Unavailable("no bot token configured".into()))
    }

    async fn validate_group(&self, _: GroupId) -> OracleResult<bool> {
        Err(OracleError::Unavailable("no bot token configured".into()))
    }

    async fn delete_mirror(&self, _: GroupId, _: MirrorLocator) -> OracleResult<bool> {
        Err(OracleError::Unavailable("no bot token configured".into()))
    }

    async fn send_artifact(
        &self,
        _: i64,
        _: &ArtifactRef,
        _: Option<&str>,
    ) -> OracleResult<MirrorLocator> {
        Err(OracleError::Unavailable("no bot token configured".into()))
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    config.apply_env(|key| std::env::var(key).ok())?;

    if let Some(db) = &args.db {
        config.store.db_path = PathBuf::from(db);
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.to_lowercase();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    let expanded = shellexpand::tilde(&config.store.db_path.to_string_lossy()).into_owned();
    config.store.db_path = PathBuf::from(expanded);

    config.validate()?;
    Ok(config)
}

fn build_gate(config: &Config) -> Result<GateService> {
    let store = SqlStore::open(
        &config.store.db_path,
        config.store.pool_size,
        config.store.busy_timeout,
    )
    .with_context(|| format!("opening database {}", config.store.db_path.display()))?;

    let oracle: Arc<dyn MembershipOracle> = match config.bot_api() {
        Ok(bot) => Arc::new(BotApiOracle::new(bot)?),
        Err(_) => {
            warn!("No bot token configured, membership checks will fail closed");
            Arc::new(Offline)
        }
    };

    Ok(GateService::new(store, oracle, config.access_policy()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_report(gate: &GateService, user: UserId, report: &EligibilityReport) {
    let verdict = if report.is_eligible() { "eligible" } else { "not eligible" };
    println!("user {user}: {verdict}");
    if gate.is_admin(user) {
        println!("  admin");
    }
    for decision in &report.decisions {
        let group = decision.group;
        match &decision.outcome {
            GroupOutcome::Accepted(status) => println!("  {group}: {status}"),
            GroupOutcome::Grace(shortfall) => println!("  {group}: pending request ({shortfall:?})"),
            GroupOutcome::Denied(shortfall) => println!("  {group}: denied ({shortfall:?})"),
        }
    }
}

async fn run_groups(gate: &GateService, command: GroupsCommand) -> Result<()> {
    match command {
        GroupsCommand::Add { group_id, reference } => {
            let entry = gate.add_group(GroupId(group_id), &reference).await?;
            print_json(&entry)?;
        }
        GroupsCommand::List => print_json(&gate.list_groups()?)?,
        GroupsCommand::Rename { old, new } => {
            if !gate.rename_group(&old, &new)? {
                bail!("no group with reference '{old}'");
            }
            println!("renamed {old} -> {new}");
        }
        GroupsCommand::Remove { reference } => {
            if !gate.remove_group(&reference)? {
                bail!("no group with reference '{reference}'");
            }
            println!("removed {reference}");
        }
    }
    Ok(())
}

async fn run_content(gate: &GateService, command: ContentCommand) -> Result<()> {
    match command {
        ContentCommand::Register { code, artifact, title, description } => {
            let mut content = NewContent::new(code, ArtifactRef::new(artifact));
            content.title = title;
            content.description = description;

            match gate.register_content(content).await? {
                RegisterOutcome::Registered { code, mirror } => match mirror {
                    Some(locator) => println!("registered {code} (mirror {locator})"),
                    None => println!("registered {code}"),
                },
                RegisterOutcome::Duplicate { mirror_discarded } => {
                    if let Some(MirrorCleanup::Failed(reason)) = mirror_discarded {
                        warn!(%reason, "Duplicate upload left in storage group");
                    }
                    bail!("code already exists, use another code");
                }
            }
        }
        ContentCommand::Show { code } => match gate.lookup_content(&code)? {
            Some(record) => print_json(&record)?,
            None => bail!("unknown code '{code}'"),
        },
        ContentCommand::List => print_json(&gate.list_codes()?)?,
        ContentCommand::Remove { code } => {
            let report = gate.remove_content(&code).await?;
            if !report.removed {
                bail!("unknown code '{code}'");
            }
            match report.mirror {
                MirrorCleanup::NotNeeded => println!("removed {code}"),
                MirrorCleanup::Deleted => println!("removed {code} and its mirror"),
                MirrorCleanup::Failed(reason) => {
                    println!("removed {code}; mirror needs manual cleanup: {reason}")
                }
            }
        }
    }
    Ok(())
}

fn run_events(gate: &GateService) -> Result<()> {
    let stdin = std::io::stdin();
    let mut applied = 0usize;

    for (n, line) in stdin.lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: MembershipEvent = serde_json::from_str(&line)
            .with_context(|| format!("line {}: not a membership event", n + 1))?;
        let effect = gate.apply_event(event)?;
        println!("{effect:?}");
        applied += 1;
    }

    info!(applied, "Membership events applied");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(LogConfig::from_config(&config.logging)?.directive("r2d2=warn"))?;
    init_metrics();

    if let Command::InitConfig { path } = &args.command {
        config.save_to_file(path)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let gate = build_gate(&config)?;

    match args.command {
        Command::InitConfig { .. } => {}
        Command::Groups(command) => run_groups(&gate, command).await?,
        Command::Content(command) => run_content(&gate, command).await?,
        Command::Check { user_id } => {
            let user = UserId(user_id);
            let report = gate.check_eligibility(user).await?;
            print_report(&gate, user, &report);
        }
        Command::Fetch { user_id, code } => match gate.fetch(UserId(user_id), &code).await? {
            FetchOutcome::Granted(record) => print_json(&record)?,
            FetchOutcome::NotEligible(_) => {
                let references = gate.join_references()?;
                bail!("not eligible; join: {}", references.join(", "));
            }
            FetchOutcome::UnknownCode => bail!("invalid or unknown code '{code}'"),
        },
        Command::Deliver { user_id, chat_id, code } => {
            match gate.deliver(UserId(user_id), chat_id, &code).await? {
                DeliveryOutcome::Delivered { code, locator } => {
                    println!("delivered {code} as message {locator}")
                }
                DeliveryOutcome::NotEligible(_) => {
                    let references = gate.join_references()?;
                    bail!("not eligible; join: {}", references.join(", "));
                }
                DeliveryOutcome::UnknownCode => bail!("invalid or unknown code '{code}'"),
                DeliveryOutcome::SendFailed { code, reason } => {
                    bail!("could not send {code}: {reason}")
                }
            }
        }
        Command::Events => run_events(&gate)?,
    }

    Ok(())
}
