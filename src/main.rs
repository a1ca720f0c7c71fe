//! Stax CLI entrypoint.
//!
//! This is the main entrypoint for the stax command-line tool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stax::cli::{
    count_by_account, Cli, Commands, LogFormat, OutputFormatter, StackPeek, StackSelection,
};
use stax::cloudformation::{CloudFormationGateway, StackGateway};
use stax::config::{
    find_config_file, AccountConfig, ConfigParser, ConfigValidator, StaxConfig, ValidationResult,
};
use stax::console::TerminalConsole;
use stax::context::ReconcileContext;
use stax::error::{ConfigError, Result, StaxError};
use stax::planner::canonical_json;
use stax::pull::{save_config, Puller, PullReport};
use stax::reconciler::{verify_account, PushOptions, PushReport, Reconciler, StackOutcome};
use stax::stack::{group_by_placement, load_stacks, StackFilter, StackSpec};

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_format);

    // Stacks are reconciled one at a time, so a single thread is enough.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Generate => cmd_generate(),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Summary { selection } => cmd_summary(config_path, &selection, &formatter),
        Commands::Edit { selection } => cmd_edit(config_path, &selection),
        Commands::Push {
            selection,
            force,
            yes,
            change_set,
            tags_only,
        } => {
            let options = PushOptions {
                force,
                change_set,
                tags_only,
                batch_size: 0,
            };
            cmd_push(config_path, &selection, options, yes, &formatter).await
        }
        Commands::Pull { selection, force } => cmd_pull(config_path, &selection, force, &formatter).await,
        Commands::Delete {
            accounts,
            regions,
            name,
        } => {
            let selection = StackSelection {
                accounts,
                regions,
                names: vec![name],
            };
            cmd_delete(config_path, &selection, &formatter).await
        }
        Commands::Peer { selection } => cmd_peer(config_path, &selection, &formatter).await,
    }
}

/// Print a sample configuration.
fn cmd_generate() -> Result<ExitCode> {
    let sample = serde_json::to_value(StaxConfig::sample())
        .map_err(|e| StaxError::internal(format!("Failed to serialize sample: {e}")))?;
    print!("{}", canonical_json(&sample)?);
    Ok(ExitCode::SUCCESS)
}

/// Validate configuration.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<ExitCode> {
    let workspace = Workspace::read(config_path)?;
    let result = ConfigValidator::new().check(&workspace.config);

    print!("{}", formatter.format_validation(&result, show_warnings));
    if !result.is_valid() {
        return Ok(ExitCode::FAILURE);
    }

    eprintln!("\nConfiguration summary:");
    eprintln!("  Accounts: {}", workspace.config.accounts.len());
    eprintln!("  Stacks: {}", workspace.config.stacks.len());

    Ok(ExitCode::SUCCESS)
}

/// Count local stacks per account.
fn cmd_summary(
    config_path: Option<&PathBuf>,
    selection: &StackSelection,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let stacks = workspace.stacks(&selection.filter())?;

    print!("{}", formatter.format_summary(&count_by_account(&stacks)));
    Ok(ExitCode::SUCCESS)
}

/// Open template and parameter files in the editor.
fn cmd_edit(config_path: Option<&PathBuf>, selection: &StackSelection) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let stacks = workspace.stacks(&selection.filter())?;
    info!("Found {} local stack(s) to edit", stacks.len());

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| String::from("vi"));

    for stack in &stacks {
        debug!("Editing {}", stack.id);
        let files = stack.template.source().into_iter().chain(stack.parameters_file.as_deref());
        for file in files {
            let status = std::process::Command::new(&editor).arg(file).status()?;
            if !status.success() {
                warn!("{editor} exited with {status} for {}", file.display());
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Reconcile the selected stacks.
async fn cmd_push(
    config_path: Option<&PathBuf>,
    selection: &StackSelection,
    mut options: PushOptions,
    assume_yes: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let stacks = workspace.stacks(&selection.filter())?;

    if options.change_set.is_some() && stacks.len() != 1 {
        return Err(StaxError::Config(ConfigError::validation_general(format!(
            "--changeset needs exactly one stack, {} selected",
            stacks.len()
        ))));
    }

    info!("Found {} local stack(s) to push", stacks.len());
    options.batch_size = stacks.len();

    let context = ReconcileContext::from_config(&workspace.config).with_assume_yes(assume_yes);

    let report = reconcile_groups(&workspace.config, &stacks, &context, &options).await;

    print!("{}", formatter.format_push(&report));
    Ok(exit_code(&report))
}

/// Delete one named stack.
async fn cmd_delete(
    config_path: Option<&PathBuf>,
    selection: &StackSelection,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let stacks: Vec<StackSpec> = workspace
        .stacks(&selection.filter())?
        .into_iter()
        .map(|stack| stack.with_purge(true))
        .collect();

    info!("Found {} local stack(s) to delete", stacks.len());
    if stacks.is_empty() {
        warn!("No local stack named {}", selection.names.join(", "));
        return Ok(ExitCode::FAILURE);
    }

    let context = ReconcileContext::from_config(&workspace.config);
    let options = PushOptions {
        batch_size: stacks.len(),
        ..PushOptions::default()
    };

    let report = reconcile_groups(&workspace.config, &stacks, &context, &options).await;

    print!("{}", formatter.format_push(&report));
    Ok(exit_code(&report))
}

/// Generate local definitions from live stacks.
async fn cmd_pull(
    config_path: Option<&PathBuf>,
    selection: &StackSelection,
    force: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let mut workspace = Workspace::load(config_path)?;

    let existing = workspace.stacks(&selection.filter())?.len();
    if existing > 0 && force {
        info!("Found {existing} existing local stack(s) to be overwritten");
    }

    let accounts: Vec<String> = if selection.accounts.is_empty() {
        workspace.config.accounts.keys().cloned().collect()
    } else {
        selection.accounts.clone()
    };
    let regions: Vec<String> = if selection.regions.is_empty() {
        workspace.config.default_region.iter().cloned().collect()
    } else {
        selection.regions.clone()
    };
    if regions.is_empty() {
        return Err(StaxError::Config(ConfigError::validation(
            "No region given and no default_region is set",
            "default_region",
        )));
    }

    let mut report = PullReport::default();
    for account_name in &accounts {
        let account = workspace
            .config
            .account(account_name)
            .cloned()
            .ok_or_else(|| StaxError::Config(ConfigError::UnknownAccount {
                account: account_name.clone(),
            }))?;

        for region in &regions {
            let gateway = CloudFormationGateway::connect(&account.profile, region).await;
            verify_account(&gateway, account_name, &account).await?;

            let puller = Puller::new(&gateway, &workspace.base_dir, account_name, region).with_force(force);
            report.extend(puller.pull(&mut workspace.config, &selection.names).await?);
        }
    }

    if report.saved() > 0 {
        save_config(&workspace.config, &workspace.path).await?;
    }

    print!("{}", formatter.format_pull(&report));
    Ok(ExitCode::SUCCESS)
}

/// Show outputs and resources of live stacks.
async fn cmd_peer(
    config_path: Option<&PathBuf>,
    selection: &StackSelection,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let workspace = Workspace::load(config_path)?;
    let stacks = workspace.stacks(&selection.filter())?;
    info!("Found {} local stack(s) to peer into", stacks.len());

    let mut peeks = Vec::new();
    for ((account_name, region), mut group) in group_by_placement(&stacks) {
        let account = workspace.account(&account_name)?;
        let gateway = CloudFormationGateway::connect(&account.profile, &region).await;

        group.sort_by(|a, b| a.name().cmp(b.name()));
        for stack in group {
            match peek(&gateway, &stack).await {
                Ok(view) => peeks.push(view),
                Err(e) if e.is_not_found() => warn!("{}: {e}", stack.id),
                Err(e) => return Err(e),
            }
        }
    }

    print!("{}", formatter.format_peek(&peeks));
    Ok(ExitCode::SUCCESS)
}

async fn peek(gateway: &dyn StackGateway, stack: &StackSpec) -> Result<StackPeek> {
    let live = gateway.describe_stack(stack.name()).await?;
    let resources = gateway.list_resources(stack.name()).await?;
    Ok(StackPeek {
        stack: stack.id.clone(),
        outputs: live.outputs,
        resources,
    })
}

/// Runs the reconciler over every (account, region) group.
async fn reconcile_groups(
    config: &StaxConfig,
    stacks: &[StackSpec],
    context: &ReconcileContext,
    options: &PushOptions,
) -> PushReport {
    let console = TerminalConsole::new();
    let mut report = PushReport::default();

    for ((account_name, region), group) in group_by_placement(stacks) {
        let Some(account) = config.account(&account_name) else {
            let message = ConfigError::UnknownAccount {
                account: account_name.clone(),
            }
            .to_string();
            for stack in group {
                report.record(stack.id, StackOutcome::Failed(message.clone()));
            }
            continue;
        };

        info!("Reconciling {} stack(s) in {account_name}/{region}", group.len());
        let gateway = CloudFormationGateway::connect(&account.profile, &region).await;
        let reconciler = Reconciler::new(&gateway, &console, context);
        report.extend(reconciler.push(&account_name, account, &group, options).await);
    }

    report
}

fn exit_code(report: &PushReport) -> ExitCode {
    if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A loaded configuration and where it came from.
struct Workspace {
    /// Path of stax.json.
    path: PathBuf,
    /// Directory relative paths resolve against.
    base_dir: PathBuf,
    /// Parsed configuration with overrides applied.
    config: StaxConfig,
}

impl Workspace {
    /// Finds, loads and validates the configuration.
    fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let workspace = Self::read(config_path)?;

        let result: ValidationResult = ConfigValidator::new().validate(&workspace.config)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }

        Ok(workspace)
    }

    /// Finds and loads the configuration without validating it.
    fn read(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = resolve_config_path(config_path)?;
        let base_dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        debug!("Loading configuration from: {}", path.display());

        let parser = ConfigParser::new().with_base_path(&base_dir);
        parser.load_dotenv()?;
        let config = parser.load_with_env(&path)?;

        Ok(Self { path, base_dir, config })
    }

    fn stacks(&self, filter: &StackFilter) -> Result<Vec<StackSpec>> {
        load_stacks(&self.config, &self.base_dir, filter)
    }

    fn account(&self, name: &str) -> Result<&AccountConfig> {
        self.config.account(name).ok_or_else(|| {
            StaxError::Config(ConfigError::UnknownAccount {
                account: name.to_string(),
            })
        })
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => find_config_file(std::env::current_dir()?),
    }
}
