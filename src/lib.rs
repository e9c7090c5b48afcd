//! Kitchen consolidation engine.
//!
//! Turns a week of catering orders (formula menus and free special carts)
//! into per-dish production counts and a raw-ingredient market list, from a
//! local snapshot of the hosted backend.

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod commands;
pub mod consolidation;
pub mod db;
pub mod details;
pub mod diagnostics;
pub mod formula;
pub mod market_list;
pub mod menu_text;
pub mod orders;
pub mod production_sheet;
pub mod settings;
pub mod special_cart;
pub mod sync;

const LOG_FORMAT_ENV: &str = "KITCHEN_LOG_FORMAT";

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "kitchen-consolidation")]
#[command(about = "Consolidate in-production catering orders into a kitchen production plan")]
#[command(version, long_version = diagnostics::LONG_VERSION)]
struct Cli {
    /// Directory holding the local database and logs
    #[arg(long, global = true, value_name = "DIR", env = "KITCHEN_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Default, Args)]
struct FilterArgs {
    /// Business unit to consolidate (defaults to the configured one)
    #[arg(long, value_name = "UNIT")]
    business_unit: Option<String>,
    /// Single request date
    #[arg(long, value_name = "YYYY-MM-DD", conflicts_with_all = ["from", "to"])]
    date: Option<String>,
    /// First request date of a range
    #[arg(long, value_name = "YYYY-MM-DD", requires = "to")]
    from: Option<String>,
    /// Last request date of a range
    #[arg(long, value_name = "YYYY-MM-DD", requires = "from")]
    to: Option<String>,
}

impl FilterArgs {
    fn payload(&self) -> Value {
        json!({
            "businessUnit": self.business_unit,
            "date": self.date,
            "from": self.from,
            "to": self.to,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Sheet,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Refresh the local snapshot from the hosted backend
    Sync {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Compute production counts and the market list
    Consolidate {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Sheet)]
        format: OutputFormat,
        /// Sheet width in columns
        #[arg(long)]
        width: Option<usize>,
        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Refresh the snapshot before computing
        #[arg(long)]
        refresh: bool,
    },
    /// Load an exported snapshot file (`{"orders": [...], "settings": {...}}`)
    Import {
        file: PathBuf,
    },
    /// Show or change backend settings
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration, secrets masked
    Show,
    /// Store one setting (supabase_url, supabase_anon_key, business_unit)
    Set { key: String, value: String },
    /// Store url, key and business unit from a connection string
    Import { connection_string: String },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Console output goes to stderr so stdout only carries results.
fn init_logging(data_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kitchen_consolidation_lib=debug"));

    let log_dir = diagnostics::get_log_dir(data_dir);
    diagnostics::prune_old_logs(&log_dir);
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let json_console = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let console_json = json_console.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_text =
        (!json_console).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_json)
        .with(console_text)
        .with(file_layer)
        .init();

    // The process is short-lived; leaking the guard keeps the writer until exit.
    std::mem::forget(_guard);
}

fn emit(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "output written");
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn emit_json(value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("formatting JSON output")?;
    emit(None, &format!("{text}\n"))
}

fn try_run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = settings::resolve_data_dir(cli.data_dir).map_err(anyhow::Error::msg)?;
    init_logging(&data_dir);
    info!(
        "Starting kitchen-consolidation v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = db::init(&data_dir)
        .map_err(anyhow::Error::msg)
        .context("opening local database")?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;

    match cli.command {
        Commands::Sync { filter } => {
            let summary = runtime
                .block_on(commands::snapshot::snapshot_refresh(&db, filter.payload()))
                .map_err(anyhow::Error::msg)
                .context("refreshing snapshot")?;
            emit_json(&summary)
        }
        Commands::Consolidate {
            filter,
            format,
            width,
            output,
            refresh,
        } => {
            let mut payload = filter.payload();
            if refresh {
                runtime
                    .block_on(commands::snapshot::snapshot_refresh(&db, payload.clone()))
                    .map_err(anyhow::Error::msg)
                    .context("refreshing snapshot")?;
            }
            let text = match format {
                OutputFormat::Json => {
                    let report = commands::consolidation::consolidation_compute(&db, payload)
                        .map_err(anyhow::Error::msg)
                        .context("computing consolidation")?;
                    format!(
                        "{}\n",
                        serde_json::to_string_pretty(&report).context("formatting report")?
                    )
                }
                OutputFormat::Sheet => {
                    payload["width"] = json!(width);
                    let printed = commands::consolidation::consolidation_print(&db, payload)
                        .map_err(anyhow::Error::msg)
                        .context("printing production sheet")?;
                    printed["sheet"].as_str().unwrap_or_default().to_string()
                }
            };
            emit(output.as_deref(), &text)
        }
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let payload: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let summary = commands::snapshot::snapshot_import(&db, payload)
                .map_err(anyhow::Error::msg)
                .context("importing snapshot")?;
            emit_json(&summary)
        }
        Commands::Config { action } => {
            let out = match action {
                ConfigCommand::Show => commands::settings::settings_show(&db),
                ConfigCommand::Set { key, value } => {
                    commands::settings::settings_set(&db, json!({ "key": key, "value": value }))
                }
                ConfigCommand::Import { connection_string } => {
                    commands::settings::settings_import_connection(
                        &db,
                        Value::String(connection_string),
                    )
                }
            }
            .map_err(anyhow::Error::msg)
            .context("updating configuration")?;
            emit_json(&out)
        }
    }
}

pub fn run() {
    let cli = Cli::parse();
    if let Err(err) = try_run(cli) {
        error!("{err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
