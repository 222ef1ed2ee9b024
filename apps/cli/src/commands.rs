//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use leaddesk_core::{
    DayWindow, DistributeOptions, DistributionOutcome, DistributionReport, ProgressReporter,
    assignment_counts, distribute_all, remaining_quota,
};
use leaddesk_shared::{
    AppConfig, Collaborator, CollaboratorId, DistributionSetting, Group, GroupId, Lead, LeadTier,
    TierFilter, init_config, load_config,
};
use leaddesk_storage::Storage;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LeadDesk: hand out incoming leads to collaborator groups under daily quotas.
#[derive(Parser)]
#[command(
    name = "leaddesk",
    version,
    about = "Distribute incoming leads to collaborator groups under daily quotas.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `defaults.db_path`).
    #[arg(long, env = "LEADDESK_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Lead intake and listing.
    Lead {
        #[command(subcommand)]
        action: LeadAction,
    },

    /// Collaborator management.
    Collaborator {
        #[command(subcommand)]
        action: CollaboratorAction,
    },

    /// Collaborator groups.
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },

    /// Per-group distribution settings.
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },

    /// Assign unassigned leads to group members within today's quota.
    Distribute(DistributeArgs),

    /// Show recent distribution runs of a group.
    Runs {
        /// Group ID or name.
        #[arg(long)]
        group: String,

        /// Number of runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Lead subcommands.
#[derive(Subcommand)]
pub(crate) enum LeadAction {
    /// Register a new lead.
    Add {
        /// Contact or company name.
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Where the lead came from.
        #[arg(long)]
        source: Option<String>,

        /// Qualification score (0-100).
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        score: Option<u8>,

        /// Tier (low, medium, high). Derived from the score when omitted.
        #[arg(long)]
        tier: Option<LeadTier>,
    },
    /// List leads in intake order.
    List {
        /// Only leads not yet assigned.
        #[arg(long)]
        unassigned: bool,

        /// Tier filter: all, low, medium or high.
        #[arg(long, default_value = "all")]
        tier: TierFilter,
    },
}

/// Collaborator subcommands.
#[derive(Subcommand)]
pub(crate) enum CollaboratorAction {
    /// Register a collaborator.
    Add {
        name: String,

        #[arg(long)]
        email: Option<String>,
    },
    /// List collaborators.
    List,
}

/// Group subcommands.
#[derive(Subcommand)]
pub(crate) enum GroupAction {
    /// Create a group, optionally with initial members (in order).
    Create {
        name: String,

        /// Collaborator ID or name (repeatable).
        #[arg(long = "member")]
        members: Vec<String>,
    },
    /// List groups with their members.
    List,
    /// Append a collaborator to a group.
    AddMember {
        /// Group ID or name.
        #[arg(long)]
        group: String,

        /// Collaborator ID or name.
        #[arg(long)]
        collaborator: String,
    },
    /// Remove a collaborator from a group.
    RemoveMember {
        /// Group ID or name.
        #[arg(long)]
        group: String,

        /// Collaborator ID or name.
        #[arg(long)]
        collaborator: String,
    },
}

/// Distribution setting subcommands.
#[derive(Subcommand)]
pub(crate) enum SettingAction {
    /// Create or replace a group's distribution setting.
    Set {
        /// Group ID or name.
        #[arg(long)]
        group: String,

        /// Leads the whole group may receive per day.
        #[arg(long)]
        quota: u32,

        /// Tier filter: all, low, medium or high.
        #[arg(long, default_value = "all")]
        tier: TierFilter,
    },
    /// Show a group's setting and today's usage.
    Show {
        /// Group ID or name.
        #[arg(long)]
        group: String,
    },
}

/// `distribute` arguments.
#[derive(Args)]
pub(crate) struct DistributeArgs {
    #[command(flatten)]
    target: DistributeTarget,

    /// Compute assignments without writing them.
    #[arg(long)]
    dry_run: bool,

    /// Commit attempts on concurrent claims (overrides config).
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub(crate) struct DistributeTarget {
    /// Group ID or name.
    #[arg(long)]
    group: Option<String>,

    /// Every group.
    #[arg(long)]
    all: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leaddesk=info,leaddesk_core=info,leaddesk_storage=warn",
        1 => "leaddesk=debug,leaddesk_core=debug,leaddesk_storage=debug",
        _ => "leaddesk=trace,leaddesk_core=trace,leaddesk_storage=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved config plus the database location.
struct Context {
    config: AppConfig,
    db_path: PathBuf,
}

impl Context {
    fn load(db: Option<PathBuf>) -> Result<Self> {
        let config = load_config()?;
        let db_path = match db {
            Some(path) => path,
            None => config.defaults.resolved_db_path()?,
        };
        Ok(Self { config, db_path })
    }

    async fn open(&self) -> Result<Storage> {
        Ok(Storage::open(&self.db_path).await?)
    }

    async fn open_readonly(&self) -> Result<Storage> {
        Ok(Storage::open_readonly(&self.db_path).await?)
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        };
    }

    let ctx = Context::load(cli.db)?;
    match cli.command {
        Command::Lead { action } => match action {
            LeadAction::Add {
                name,
                email,
                phone,
                source,
                score,
                tier,
            } => {
                let mut lead = Lead::new(name, tier);
                lead.email = email;
                lead.phone = phone;
                lead.source = source;
                lead.score = score;
                cmd_lead_add(&ctx, lead).await
            }
            LeadAction::List { unassigned, tier } => cmd_lead_list(&ctx, unassigned, tier).await,
        },
        Command::Collaborator { action } => match action {
            CollaboratorAction::Add { name, email } => {
                cmd_collaborator_add(&ctx, name, email).await
            }
            CollaboratorAction::List => cmd_collaborator_list(&ctx).await,
        },
        Command::Group { action } => match action {
            GroupAction::Create { name, members } => cmd_group_create(&ctx, name, &members).await,
            GroupAction::List => cmd_group_list(&ctx).await,
            GroupAction::AddMember {
                group,
                collaborator,
            } => cmd_group_member(&ctx, &group, &collaborator, true).await,
            GroupAction::RemoveMember {
                group,
                collaborator,
            } => cmd_group_member(&ctx, &group, &collaborator, false).await,
        },
        Command::Setting { action } => match action {
            SettingAction::Set { group, quota, tier } => {
                cmd_setting_set(&ctx, &group, quota, tier).await
            }
            SettingAction::Show { group } => cmd_setting_show(&ctx, &group).await,
        },
        Command::Distribute(args) => cmd_distribute(&ctx, args).await,
        Command::Runs { group, limit } => cmd_runs(&ctx, &group, limit).await,
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Lookup helpers
// ---------------------------------------------------------------------------

/// Find a group by ID, falling back to its (unique) name.
async fn resolve_group(storage: &Storage, key: &str) -> Result<Group> {
    if let Ok(id) = key.parse::<GroupId>() {
        if let Some(group) = storage.get_group(&id).await? {
            return Ok(group);
        }
    }
    storage
        .list_groups()
        .await?
        .into_iter()
        .find(|g| g.name == key)
        .ok_or_else(|| eyre!("group not found: {key}"))
}

/// Find a collaborator by ID, falling back to an unambiguous name.
async fn resolve_collaborator(storage: &Storage, key: &str) -> Result<Collaborator> {
    if let Ok(id) = key.parse::<CollaboratorId>() {
        if let Some(collaborator) = storage.get_collaborator(&id).await? {
            return Ok(collaborator);
        }
    }
    let mut matches: Vec<Collaborator> = storage
        .list_collaborators()
        .await?
        .into_iter()
        .filter(|c| c.name == key)
        .collect();
    match matches.len() {
        0 => Err(eyre!("collaborator not found: {key}")),
        1 => Ok(matches.remove(0)),
        n => Err(eyre!("{n} collaborators are named '{key}', use the ID")),
    }
}

async fn collaborator_names(storage: &Storage) -> Result<HashMap<CollaboratorId, String>> {
    Ok(storage
        .list_collaborators()
        .await?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

fn name_of(names: &HashMap<CollaboratorId, String>, id: &CollaboratorId) -> String {
    names.get(id).cloned().unwrap_or_else(|| id.to_string())
}

// ---------------------------------------------------------------------------
// Leads & collaborators
// ---------------------------------------------------------------------------

async fn cmd_lead_add(ctx: &Context, mut lead: Lead) -> Result<()> {
    if lead.tier.is_none() {
        lead.tier = lead
            .score
            .map(|score| LeadTier::from_score(score, &ctx.config.scoring));
    }

    let storage = ctx.open().await?;
    storage.insert_lead(&lead).await?;
    info!(lead = %lead.id, tier = ?lead.tier, "lead added");

    println!("Lead added: {}", lead.id);
    if let Some(tier) = lead.tier {
        println!("  Tier: {}", tier.label());
    }
    Ok(())
}

async fn cmd_lead_list(ctx: &Context, unassigned: bool, tier: TierFilter) -> Result<()> {
    let storage = ctx.open_readonly().await?;
    let leads = storage.list_leads(unassigned, tier).await?;
    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }
    let names = collaborator_names(&storage).await?;

    println!(
        "{:<36}  {:<24}  {:<14}  {:<10}  ASSIGNED TO",
        "ID", "NAME", "TIER", "STATUS"
    );
    for lead in &leads {
        let tier = lead.tier.map_or("-", |t| t.label());
        let assignee = lead
            .assigned_collaborator_id
            .as_ref()
            .map_or_else(|| "-".to_string(), |id| name_of(&names, id));
        println!(
            "{:<36}  {:<24}  {:<14}  {:<10}  {assignee}",
            lead.id,
            lead.name,
            tier,
            lead.status.as_str()
        );
    }
    println!("\n{} lead(s)", leads.len());
    Ok(())
}

async fn cmd_collaborator_add(ctx: &Context, name: String, email: Option<String>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(eyre!("collaborator name must not be empty"));
    }
    let collaborator = Collaborator {
        id: CollaboratorId::new(),
        name,
        email,
        created_at: Utc::now(),
    };
    let storage = ctx.open().await?;
    storage.insert_collaborator(&collaborator).await?;
    info!(collaborator = %collaborator.id, "collaborator added");
    println!("Collaborator added: {}", collaborator.id);
    Ok(())
}

async fn cmd_collaborator_list(ctx: &Context) -> Result<()> {
    let storage = ctx.open_readonly().await?;
    let collaborators = storage.list_collaborators().await?;
    if collaborators.is_empty() {
        println!("No collaborators.");
        return Ok(());
    }
    for c in &collaborators {
        println!(
            "{}  {:<24}  {}",
            c.id,
            c.name,
            c.email.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Groups & settings
// ---------------------------------------------------------------------------

async fn cmd_group_create(ctx: &Context, name: String, members: &[String]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(eyre!("group name must not be empty"));
    }
    let storage = ctx.open().await?;

    let mut member_ids = Vec::with_capacity(members.len());
    for key in members {
        member_ids.push(resolve_collaborator(&storage, key).await?.id);
    }

    let group = Group {
        id: GroupId::new(),
        name,
        member_ids,
        created_at: Utc::now(),
    };
    storage.insert_group(&group).await?;
    info!(group = %group.id, members = group.member_ids.len(), "group created");
    println!("Group created: {}", group.id);
    Ok(())
}

async fn cmd_group_list(ctx: &Context) -> Result<()> {
    let storage = ctx.open_readonly().await?;
    let groups = storage.list_groups().await?;
    if groups.is_empty() {
        println!("No groups.");
        return Ok(());
    }
    let names = collaborator_names(&storage).await?;

    for group in &groups {
        let setting = match storage.get_distribution_setting(&group.id).await? {
            Some(s) => format!("quota {}/day, tier {}", s.daily_quota, s.lead_tier),
            None => "no setting".to_string(),
        };
        println!("{}  {}  ({setting})", group.id, group.name);
        for id in &group.member_ids {
            println!("    - {}", name_of(&names, id));
        }
    }
    Ok(())
}

async fn cmd_group_member(ctx: &Context, group: &str, collaborator: &str, add: bool) -> Result<()> {
    let storage = ctx.open().await?;
    let group = resolve_group(&storage, group).await?;
    let collaborator = resolve_collaborator(&storage, collaborator).await?;

    let changed = if add {
        storage.add_group_member(&group.id, &collaborator.id).await?
    } else {
        storage
            .remove_group_member(&group.id, &collaborator.id)
            .await?
    };

    match (add, changed) {
        (true, true) => println!("Added {} to {}", collaborator.name, group.name),
        (true, false) => println!("{} is already in {}", collaborator.name, group.name),
        (false, true) => println!("Removed {} from {}", collaborator.name, group.name),
        (false, false) => println!("{} is not in {}", collaborator.name, group.name),
    }
    Ok(())
}

async fn cmd_setting_set(ctx: &Context, group: &str, quota: u32, tier: TierFilter) -> Result<()> {
    let storage = ctx.open().await?;
    let group = resolve_group(&storage, group).await?;
    let setting = DistributionSetting {
        group_id: group.id.clone(),
        daily_quota: quota,
        lead_tier: tier,
        updated_at: Utc::now(),
    };
    storage.upsert_distribution_setting(&setting).await?;
    info!(group = %group.id, quota, tier = %tier, "distribution setting saved");
    println!("{}: quota {quota}/day, tier {tier}", group.name);
    Ok(())
}

async fn cmd_setting_show(ctx: &Context, group: &str) -> Result<()> {
    let storage = ctx.open_readonly().await?;
    let group = resolve_group(&storage, group).await?;
    let Some(setting) = storage.get_distribution_setting(&group.id).await? else {
        println!("{} has no distribution setting.", group.name);
        return Ok(());
    };

    let window = DayWindow::containing(Utc::now(), ctx.config.distribution.utc_offset()?);
    let assigned = storage
        .list_leads_assigned_between(window.start, window.end)
        .await?;
    let counts = assignment_counts(&assigned, &window);
    let remaining = remaining_quota(&group, &setting, &counts).max(0);

    println!("Group:     {}", group.name);
    println!("Quota:     {}/day", setting.daily_quota);
    println!("Tier:      {}", setting.lead_tier);
    println!("Remaining: {remaining} today");
    println!("Updated:   {}", setting.updated_at.to_rfc3339());
    Ok(())
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

async fn cmd_distribute(ctx: &Context, args: DistributeArgs) -> Result<()> {
    let mut options = DistributeOptions::from_config(&ctx.config.distribution, Utc::now())?;
    options.dry_run = args.dry_run;
    if let Some(attempts) = args.max_attempts {
        options.max_attempts = attempts;
    }

    let storage = if args.dry_run {
        ctx.open_readonly().await?
    } else {
        ctx.open().await?
    };

    let groups = match (&args.target.group, args.target.all) {
        (Some(key), _) => vec![resolve_group(&storage, key).await?],
        (None, true) => storage.list_groups().await?,
        (None, false) => return Err(eyre!("pass --group <id> or --all")),
    };
    if groups.is_empty() {
        println!("No groups to distribute.");
        return Ok(());
    }
    let group_ids: Vec<GroupId> = groups.iter().map(|g| g.id.clone()).collect();

    info!(
        groups = group_ids.len(),
        dry_run = options.dry_run,
        "starting distribution"
    );

    let mut run_ids = Vec::new();
    if !options.dry_run {
        for id in &group_ids {
            run_ids.push(storage.insert_distribution_run(id).await?);
        }
    }

    let progress = CliProgress::new(group_ids.len() as u64);
    let reports = distribute_all(&storage, &group_ids, &options, &progress).await;
    progress.finish();

    for (run_id, report) in run_ids.iter().zip(&reports) {
        let stats = serde_json::to_string(report)?;
        if let Err(e) = storage.finish_distribution_run(run_id, &stats).await {
            warn!(run = %run_id, error = %e, "failed to record distribution run");
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        let names = collaborator_names(&storage).await?;
        for report in &reports {
            print_report(report, &names);
        }
    }

    let failed = reports
        .iter()
        .filter(|r| matches!(r.outcome, DistributionOutcome::Failed { .. }))
        .count();
    if failed > 0 {
        return Err(eyre!("{failed} group(s) failed to distribute"));
    }
    Ok(())
}

fn print_report(report: &DistributionReport, names: &HashMap<CollaboratorId, String>) {
    let group = report
        .group_name
        .clone()
        .unwrap_or_else(|| report.group_id.to_string());

    println!();
    match &report.outcome {
        DistributionOutcome::Assigned => {
            println!("  {group}: assigned {} lead(s)", report.actions.len())
        }
        DistributionOutcome::Planned => {
            println!("  {group}: would assign {} lead(s)", report.actions.len())
        }
        DistributionOutcome::QuotaMet => println!("  {group}: daily quota already met"),
        DistributionOutcome::NoEligibleCollaborators => println!("  {group}: no members"),
        DistributionOutcome::NoLeads => println!("  {group}: no matching unassigned leads"),
        DistributionOutcome::Failed { error } => println!("  {group}: failed: {error}"),
    }

    if !report.actions.is_empty() {
        let mut per_member: Vec<(CollaboratorId, usize)> = Vec::new();
        for action in &report.actions {
            match per_member
                .iter_mut()
                .find(|(id, _)| *id == action.collaborator_id)
            {
                Some((_, n)) => *n += 1,
                None => per_member.push((action.collaborator_id.clone(), 1)),
            }
        }
        for (id, n) in &per_member {
            println!("    {:<24} {n}", name_of(names, id));
        }
        println!(
            "  Remaining before run: {}  Attempts: {}  Time: {}ms",
            report.remaining_quota, report.attempts, report.elapsed_ms
        );
    }
}

async fn cmd_runs(ctx: &Context, group: &str, limit: u32) -> Result<()> {
    let storage = ctx.open_readonly().await?;
    let group = resolve_group(&storage, group).await?;
    let runs = storage.list_distribution_runs(&group.id, limit).await?;
    if runs.is_empty() {
        println!("No distribution runs for {}.", group.name);
        return Ok(());
    }

    println!("{:<32}  {:<12}  ASSIGNED", "STARTED", "OUTCOME");
    for run in &runs {
        let stats: Option<serde_json::Value> = run
            .stats_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let outcome = stats
            .as_ref()
            .and_then(|v| v["outcome"]["kind"].as_str())
            .unwrap_or(if run.finished_at.is_some() {
                "unknown"
            } else {
                "unfinished"
            })
            .to_string();
        let assigned = match stats.as_ref() {
            Some(v) if v["outcome"]["kind"] == "assigned" => {
                v["actions"].as_array().map_or(0, Vec::len)
            }
            _ => 0,
        };
        println!(
            "{:<32}  {:<12}  {assigned}",
            run.started_at.to_rfc3339(),
            outcome
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar over groups.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(groups: u64) -> Self {
        let bar = ProgressBar::new(groups);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn group_done(&self, report: &DistributionReport) {
        self.bar.inc(1);
        if let Some(name) = &report.group_name {
            self.bar.set_message(format!("Finished {name}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
