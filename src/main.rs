use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use leosync::config::{Config, ConnectionOverrides};
use leosync::leostream::client::LeostreamClient;
use leosync::leostream::http::format_api_error;
use leosync::resource::{
    init_registry, materialize_defaults, Instance, ReadOutcome, Reconciler, ResourceKind,
    UpdateOutcome,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Exit status when an update needs destroy-then-create
const EXIT_REPLACE_REQUIRED: i32 = 2;

/// Reconcile Leostream gateways, centers and pools against declarative documents
#[derive(Parser, Debug)]
#[command(name = "leosync", version, about, long_about = None)]
struct Args {
    /// Resource kind: gateway, center, pool or aws_pool
    #[arg(value_parser = parse_kind)]
    kind: ResourceKind,

    #[command(subcommand)]
    command: Command,

    /// Leostream broker host or base URL
    #[arg(long, global = true)]
    host: Option<String>,

    /// Leostream API user
    #[arg(long, global = true)]
    username: Option<String>,

    /// Leostream API password (prefer the environment)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an object from a desired document
    Create {
        /// JSON or YAML document
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print the current state of an object
    Read { id: String },
    /// Apply a desired document to an existing object
    Update {
        id: String,
        #[arg(short, long)]
        file: PathBuf,
        /// Last known state; read from the broker when omitted
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Delete an object (succeeds if it is already gone)
    Delete { id: String },
    /// Adopt an existing object
    Import { id: String },
    /// List all objects of the kind
    List,
    /// Print the default document of the kind
    Schema,
}

fn parse_kind(s: &str) -> std::result::Result<ResourceKind, String> {
    s.parse()
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("leosync started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("leosync").join("leosync.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".leosync").join("leosync.log");
    }
    PathBuf::from("leosync.log")
}

/// Load a JSON or YAML document, chosen by file extension
fn read_document(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {:?}", path))
    } else {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        },
    };

    let code = match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {}", format_api_error(&err));
            1
        },
    };

    // Flush the log writer before exiting
    drop(log_guard);
    std::process::exit(code);
}

async fn run(args: Args) -> Result<i32> {
    let config = Config::load();
    let schemas = init_registry(&config.bootstrap);
    let def = schemas.get(args.kind);

    if let Command::Schema = args.command {
        print_json(&materialize_defaults(&def.schema))?;
        return Ok(0);
    }

    let overrides = ConnectionOverrides {
        host: args.host.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
    };
    let settings = config.connection(&overrides)?;
    tracing::info!("Using broker {}", settings.base_url);

    let client = Arc::new(LeostreamClient::new(&settings)?);
    let reconciler = Reconciler::new(client, def);
    let kind = args.kind;

    match args.command {
        Command::Create { file } => {
            let desired = read_document(&file)?;
            let mut instance = Instance::absent();
            let state = reconciler.create(&mut instance, &desired).await?;
            print_json(&state)?;
        },
        Command::Read { id } => {
            let mut instance = Instance::present(id.clone(), None);
            match reconciler.read(&mut instance).await? {
                ReadOutcome::Present(state) => print_json(&state)?,
                ReadOutcome::Gone => eprintln!("{} {} no longer exists", kind, id),
            }
        },
        Command::Update { id, file, state } => {
            let desired = read_document(&file)?;
            let current = state.as_deref().map(read_document).transpose()?;
            let mut instance = Instance::present(id, current);
            match reconciler.update(&mut instance, &desired).await? {
                UpdateOutcome::Updated(state) => print_json(&state)?,
                UpdateOutcome::ReplaceRequired(changes) => {
                    eprintln!("Update requires replacing the {}; changed attributes:", kind);
                    for change in changes.iter().filter(|c| c.requires_replace) {
                        eprintln!("  {}: {} -> {}", change.path, change.old, change.new);
                    }
                    return Ok(EXIT_REPLACE_REQUIRED);
                },
            }
        },
        Command::Delete { id } => {
            let mut instance = Instance::present(id.clone(), None);
            reconciler.delete(&mut instance).await?;
            eprintln!("Deleted {} {}", kind, id);
        },
        Command::Import { id } => {
            let instance = reconciler.import(&id).await?;
            if let Some(state) = instance.state() {
                print_json(state)?;
            }
        },
        Command::List => {
            let records = reconciler.list().await?;
            print_json(&Value::Array(records))?;
        },
        Command::Schema => {},
    }

    Ok(0)
}
