//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use sensor_live_view::core::config::Config;
use sensor_live_view::core::errors::SlvError;
use sensor_live_view::fetch::SnapshotFetcher;
use sensor_live_view::fetch::http::ApiClient;
use sensor_live_view::fetch::replay::FileFetcher;
use sensor_live_view::logger::activity::{ActivityLoggerHandle, spawn_logger};
use sensor_live_view::logger::jsonl::JsonlConfig;
use sensor_live_view::model::catalog::LinkStatus;
use sensor_live_view::model::record::DataFamily;
use sensor_live_view::model::scope::{ControllerId, Scope};
use sensor_live_view::present::format::format_measurement;
use sensor_live_view::present::terminal::{
    KeyboardCommands, LinePresenter, ScreenGuard, TablePresenter,
};
use sensor_live_view::present::{NullPresentation, Presentation};
use sensor_live_view::runtime::signals::ControlSignals;
use sensor_live_view::runtime::watch::{WatchOptions, WatchRuntime, WatchSummary};
use sensor_live_view::sync::diff::ViewStatus;
use sensor_live_view::sync::session::ViewSession;

/// Live view of sensor readings and controller event logs.
#[derive(Debug, Parser)]
#[command(
    name = "slv",
    author,
    version,
    about = "Sensor Live View - incremental live tables over a polled REST backend",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List controllers.
    Controllers,
    /// List trials of a controller.
    Trials(TrialsArgs),
    /// Quick status from the most recent reading.
    Latest,
    /// Follow a controller's readings or logs live.
    Watch(WatchArgs),
    /// Fetch a view once and write it as CSV.
    Export(ExportArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct TrialsArgs {
    /// Controller UUID.
    controller: String,
}

#[derive(Debug, Clone, Args)]
struct ViewArgs {
    /// Controller UUID.
    controller: String,
    /// Narrow to one trial.
    #[arg(long, value_name = "TRIAL")]
    trial: Option<String>,
    /// Show event logs instead of sensor readings.
    #[arg(long)]
    logs: bool,
    /// Read snapshots from a JSON file instead of the API.
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,
}

impl ViewArgs {
    fn scope(&self) -> Scope {
        match &self.trial {
            Some(trial) => Scope::with_trial(self.controller.as_str(), trial.as_str()),
            None => Scope::controller(self.controller.as_str()),
        }
    }

    const fn family(&self) -> DataFamily {
        if self.logs {
            DataFamily::Logs
        } else {
            DataFamily::Readings
        }
    }
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    #[command(flatten)]
    view: ViewArgs,
    /// Poll interval override in milliseconds.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(100..))]
    interval_ms: Option<u64>,
    /// Append lines instead of drawing a full-screen table.
    #[arg(long)]
    plain: bool,
    /// Stop after this many seconds.
    #[arg(long, value_name = "SECONDS")]
    for_secs: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ExportArgs {
    #[command(flatten)]
    view: ViewArgs,
    /// Directory for the CSV file (defaults to `export.output_dir`).
    #[arg(long, value_name = "DIR", conflicts_with = "stdout")]
    output_dir: Option<PathBuf>,
    /// Write the CSV to stdout instead of a file.
    #[arg(long)]
    stdout: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<SlvError> for CliError {
    fn from(err: SlvError) -> Self {
        match err {
            SlvError::InvalidConfig { .. }
            | SlvError::MissingConfig { .. }
            | SlvError::ConfigParse { .. }
            | SlvError::InvalidScope { .. } => Self::User(err.to_string()),
            SlvError::Fetch { .. }
            | SlvError::Io { .. }
            | SlvError::ChannelClosed { .. }
            | SlvError::Runtime { .. } => Self::Runtime(err.to_string()),
            SlvError::StaleResultDiscarded { .. } | SlvError::Serialization { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Controllers => run_controllers(cli),
        Command::Trials(args) => run_trials(cli, args),
        Command::Latest => run_latest(cli),
        Command::Watch(args) => run_watch(cli, args),
        Command::Export(args) => run_export(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── catalog commands ────────────────────

fn catalog_error(endpoint: &str, source: sensor_live_view::fetch::FetchError) -> CliError {
    SlvError::Fetch {
        scope: endpoint.to_string(),
        source,
    }
    .into()
}

fn run_controllers(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let client = ApiClient::new(config.api.clone());
    let controllers = client
        .controllers()
        .map_err(|e| catalog_error("controllers", e))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if controllers.is_empty() {
                println!("No controllers registered.");
                return Ok(());
            }
            let clock = config.display.clock();
            println!(
                "{:<36}  {:<20}  {:<9}  {:>8}  REGISTERED",
                "ID", "NAME", "STATE", "BATTERY"
            );
            for controller in &controllers {
                let battery = controller
                    .battery_v
                    .map_or_else(|| "-".to_string(), |v| format!("{} V", format_measurement(v)));
                println!(
                    "{:<36}  {:<20}  {:<9}  {:>8}  {}",
                    controller.id,
                    controller.name,
                    controller.state,
                    battery,
                    clock.format_date(controller.registered_at)
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "controllers",
                "controllers": serde_json::to_value(&controllers)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_trials(cli: &Cli, args: &TrialsArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let client = ApiClient::new(config.api.clone());
    let controller = ControllerId::new(args.controller.as_str());
    let trials = client
        .trials(&controller)
        .map_err(|e| catalog_error("trials", e))?;

    match output_mode(cli) {
        OutputMode::Human => {
            if trials.is_empty() {
                println!("No trials for controller {controller}.");
                return Ok(());
            }
            let clock = config.display.clock();
            println!("{:<36}  {:<24}  {:<8}  REGISTERED", "ID", "NAME", "STATE");
            for trial in &trials {
                println!(
                    "{:<36}  {:<24}  {:<8}  {}",
                    trial.id,
                    trial.name,
                    trial.state,
                    clock.format_date(trial.registered_at)
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "trials",
                "controller": controller,
                "trials": serde_json::to_value(&trials)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_latest(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let client = ApiClient::new(config.api.clone());
    let latest = client.latest().map_err(|e| catalog_error("latest", e))?;
    let status = LinkStatus::from_latest(latest.as_ref());

    match output_mode(cli) {
        OutputMode::Human => {
            let label = match status {
                LinkStatus::Active => status.to_string().green(),
                LinkStatus::Inactive => status.to_string().red(),
            };
            println!("Status: {label}");
            if let Some(latest) = &latest {
                let clock = config.display.clock();
                println!("  Controller:  {}", latest.controller);
                println!(
                    "  At:          {} {}",
                    clock.format_date(latest.at),
                    clock.format_time(latest.at)
                );
                println!(
                    "  Temperature: {} °C",
                    format_measurement(latest.reading.temperature_c)
                );
                println!(
                    "  Humidity:    {} %",
                    format_measurement(latest.reading.humidity_pct)
                );
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "latest",
                "status": status,
                "latest": serde_json::to_value(&latest)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── watch ────────────────────

fn build_fetcher(config: &Config, replay: Option<&Path>) -> Arc<dyn SnapshotFetcher> {
    match replay {
        Some(path) => Arc::new(FileFetcher::new(path)),
        None => Arc::new(ApiClient::new(config.api.clone())),
    }
}

fn start_logger(config: &Config) -> Result<(ActivityLoggerHandle, std::thread::JoinHandle<()>), CliError> {
    Ok(spawn_logger(JsonlConfig::at(
        config.paths.activity_log.clone(),
    ))?)
}

fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let fetcher = build_fetcher(&config, args.view.replay.as_deref());
    let source_label = fetcher.describe();
    if cli.verbose {
        eprintln!("[SLV-SYNC] source: {source_label}");
        eprintln!(
            "[SLV-SYNC] activity log: {}",
            config.paths.activity_log.display()
        );
    }

    let mut options = WatchOptions::new(args.view.scope(), args.view.family());
    options.run_for = args.for_secs.map(Duration::from_secs);

    let mode = output_mode(cli);
    let interactive = mode == OutputMode::Human && !args.plain && io::stdout().is_terminal();
    let clock = config.display.clock();
    let (logger, logger_join) = start_logger(&config)?;

    let result = if interactive {
        let guard = ScreenGuard::enter()?;
        let presenter = TablePresenter::new(io::stdout(), clock);
        let outcome = drive_watch(
            cli,
            config,
            args,
            fetcher,
            presenter,
            &logger,
            &source_label,
            &options,
            true,
        );
        drop(guard);
        outcome
    } else {
        let presenter = LinePresenter::new(
            io::stdout(),
            clock,
            mode == OutputMode::Json,
            !cli.no_color,
        );
        drive_watch(
            cli,
            config,
            args,
            fetcher,
            presenter,
            &logger,
            &source_label,
            &options,
            false,
        )
    };

    if logger.dropped_events() > 0 && cli.verbose {
        eprintln!(
            "[SLV-SYNC] activity log dropped {} events",
            logger.dropped_events()
        );
    }
    logger.shutdown();
    let _ = logger_join.join();

    let summary = result?;
    if !cli.quiet && mode == OutputMode::Human {
        eprintln!(
            "watch stopped ({}): {} rows after {}s",
            summary.reason.label(),
            summary.rows,
            summary.uptime.as_secs()
        );
        for path in &summary.exports {
            eprintln!("  exported {}", path.display());
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn drive_watch<P: Presentation>(
    cli: &Cli,
    config: Config,
    args: &WatchArgs,
    fetcher: Arc<dyn SnapshotFetcher>,
    presenter: P,
    logger: &ActivityLoggerHandle,
    source_label: &str,
    options: &WatchOptions,
    keyboard: bool,
) -> Result<WatchSummary, CliError> {
    let mut session = ViewSession::new(&config, fetcher, presenter, logger.clone())?;
    session.set_interval_override(args.interval_ms.map(Duration::from_millis));

    let mut runtime = WatchRuntime::new(
        config,
        cli.config.clone(),
        session,
        logger.clone(),
        source_label,
    );
    runtime.add_source(Box::new(ControlSignals::install()));
    if keyboard {
        runtime.add_source(Box::new(KeyboardCommands));
    }
    Ok(runtime.run(options)?)
}

// ──────────────────── export ────────────────────

const EXPORT_GRACE: Duration = Duration::from_secs(2);

fn run_export(cli: &Cli, args: &ExportArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let fetcher = build_fetcher(&config, args.view.replay.as_deref());
    let (logger, logger_join) = start_logger(&config)?;

    let result = export_once(cli, &config, fetcher, &logger, args);

    logger.shutdown();
    let _ = logger_join.join();
    result
}

fn export_once(
    cli: &Cli,
    config: &Config,
    fetcher: Arc<dyn SnapshotFetcher>,
    logger: &ActivityLoggerHandle,
    args: &ExportArgs,
) -> Result<(), CliError> {
    let mut session = ViewSession::new(config, fetcher, NullPresentation, logger.clone())?;
    session.activate_view(args.view.scope(), args.view.family(), Instant::now())?;

    let deadline = Instant::now() + config.api.timeout() + EXPORT_GRACE;
    while *session.status() == ViewStatus::Loading {
        if Instant::now() >= deadline {
            session.shutdown();
            return Err(CliError::Runtime(
                "timed out waiting for the first snapshot".to_string(),
            ));
        }
        session.wait_for_activity(Duration::from_millis(100))?;
    }
    if let ViewStatus::Error { message, .. } = session.status() {
        let message = message.clone();
        session.shutdown();
        return Err(CliError::Runtime(format!("fetch failed: {message}")));
    }

    let outcome = if args.stdout {
        session.export_current_view().map(|csv| {
            print!("{csv}");
            None
        })
    } else {
        let dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| config.export.output_dir.clone());
        session
            .export_to_dir(&dir, Local::now().date_naive())
            .map(Some)
    };
    let rows = session.live_view().len();
    session.shutdown();

    if let Some(path) = outcome? {
        Report {
            human: vec![format!("Exported {rows} rows to {}", path.display())],
            json: json!({
                "command": "export",
                "path": path.to_string_lossy(),
                "rows": rows,
            }),
        }
        .emit(cli)?;
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let report = match &args.command {
        None | Some(ConfigCommand::Path) => {
            config_path_report(&cli.config.clone().unwrap_or_else(Config::default_path))
        }
        Some(ConfigCommand::Show) => {
            let config = load_config(cli)?;
            let mut human = vec![format!("# {}", config.paths.config_file.display())];
            human.extend(config_summary(&config));
            Report {
                human,
                json: json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }),
            }
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                let mut human = vec![
                    format!("valid    {}", config.paths.config_file.display()),
                    format!("hash     {hash}"),
                ];
                human.extend(config_summary(&config));
                Report {
                    human,
                    json: json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    }),
                }
            }
            Err(err) => {
                Report {
                    human: vec![format!("invalid  {err}")],
                    json: json!({
                        "command": "config validate",
                        "valid": false,
                        "code": err.code(),
                        "error": err.to_string(),
                    }),
                }
                .emit(cli)?;
                return Err(err.into());
            }
        },
    };
    report.emit(cli)
}

fn config_path_report(path: &Path) -> Report {
    let exists = path.exists();
    let mut human = vec![path.display().to_string()];
    if !exists {
        human.push("  (not found; built-in defaults apply)".to_string());
    }
    Report {
        human,
        json: json!({
            "command": "config path",
            "path": path.to_string_lossy(),
            "exists": exists,
        }),
    }
}

/// One line per concern: where data comes from, how often each family polls,
/// and where output goes.
fn config_summary(config: &Config) -> Vec<String> {
    let api = &config.api;
    let polling = &config.polling;
    let token = if api.auth_token.is_some() { "token set" } else { "no token" };
    let display = config
        .display
        .utc_offset_minutes
        .map_or_else(|| "local time".to_string(), |minutes| format!("UTC{minutes:+} min"));
    vec![
        format!(
            "api      {} (timeout {} ms, page {}, {token})",
            api.base_url, api.timeout_ms, api.snapshot_limit
        ),
        format!(
            "readings every {} ms, fresh for {} ms",
            polling.readings_interval_ms, polling.readings_fresh_ms
        ),
        format!(
            "logs     every {} ms, fresh for {} ms",
            polling.logs_interval_ms, polling.logs_fresh_ms
        ),
        format!("display  {display}"),
        format!("export   {}", config.export.output_dir.display()),
        format!("activity {}", config.paths.activity_log.display()),
    ]
}

// ──────────────────── helpers ────────────────────

/// Result of a one-shot command, rendered per [`OutputMode`].
struct Report {
    human: Vec<String>,
    json: Value,
}

impl Report {
    fn emit(&self, cli: &Cli) -> Result<(), CliError> {
        match output_mode(cli) {
            OutputMode::Human => {
                if !cli.quiet {
                    for line in &self.human {
                        println!("{line}");
                    }
                }
                Ok(())
            }
            OutputMode::Json => write_json_line(&self.json),
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    if cli.verbose {
        eprintln!(
            "[SLV-CONFIG] loaded {} (api {})",
            config.paths.config_file.display(),
            config.api.base_url
        );
    }
    Ok(config)
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SLV_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
