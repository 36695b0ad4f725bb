// crates/acstore-cli/src/main.rs
// ============================================================================
// Module: acstore CLI Entry Point
// Description: Command dispatcher for inspecting and loading acstore files.
// Purpose: Provide check, info, list, and import commands over SQLite stores.
// Dependencies: clap, acstore-config, acstore-core, acstore-store-sqlite,
//               serde_json, thiserror, tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! The acstore CLI opens `SQLite` attribute container stores using the
//! container definitions named in the configuration file and on the command
//! line. Inspection commands open stores read-only; `import` adds containers
//! from JSON lines and commits them on close. Inputs are untrusted: input
//! files are size-limited and every line is validated against the container
//! definition before it is written.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use acstore_config::AcstoreConfig;
use acstore_core::AttributeContainer;
use acstore_core::AttributeContainerStore;
use acstore_core::AttributeContainersManager;
use acstore_core::ContainerDefinition;
use acstore_core::SchemaHelper;
use acstore_core::StorageProfiler;
use acstore_core::read_definitions_file;
use acstore_store_sqlite::SqliteAttributeContainerStore;
use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a JSON lines import file.
const MAX_IMPORT_BYTES: usize = 64 * 1024 * 1024;
/// Environment variable holding a log filter directive.
const LOG_ENV: &str = "ACSTORE_LOG";
/// Key wrapping attribute values in `list` output lines.
const ATTRIBUTES_KEY: &str = "attributes";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "acstore", version, disable_help_subcommand = true)]
struct Cli {
    /// Configuration file (overrides `ACSTORE_CONFIG`).
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Container definition YAML file; may be repeated.
    #[arg(long = "definitions", value_name = "FILE", action = ArgAction::Append, global = true)]
    definitions: Vec<PathBuf>,
    /// Log filter directive (overrides `ACSTORE_LOG` and the config).
    #[arg(long, value_name = "FILTER", global = true)]
    log_level: Option<String>,
    /// Print storage timings as JSON to stderr on exit.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    profile: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Report whether a file is a supported store.
    Check(CheckCommand),
    /// Print the store format and per-type container counts.
    Info(InfoCommand),
    /// Print containers of a type as JSON lines.
    List(ListCommand),
    /// Add containers of a type from a JSON lines file.
    Import(ImportCommand),
}

/// Arguments for `check`.
#[derive(Args, Debug)]
struct CheckCommand {
    /// Store file; defaults to `store.path` from the config.
    path: Option<PathBuf>,
}

/// Arguments for `info`.
#[derive(Args, Debug)]
struct InfoCommand {
    /// Store file; defaults to `store.path` from the config.
    path: Option<PathBuf>,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
struct ListCommand {
    /// Store file; defaults to `store.path` from the config.
    path: Option<PathBuf>,
    /// Container type to list.
    #[arg(long = "type", value_name = "TYPE")]
    container_type: String,
    /// Filter expression, e.g. `parser == 'winreg' and not is_system`.
    #[arg(long, value_name = "EXPR")]
    filter: Option<String>,
}

/// Arguments for `import`.
#[derive(Args, Debug)]
struct ImportCommand {
    /// Store file; defaults to `store.path` from the config.
    path: Option<PathBuf>,
    /// Container type of the imported lines.
    #[arg(long = "type", value_name = "TYPE")]
    container_type: String,
    /// JSON lines file with one container per line.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// Result type for CLI helpers.
type CliResult<T> = Result<T, CliError>;

/// Errors returned by bounded file reads.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// File I/O failure.
    #[error("{0}")]
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    #[error("file is {size} bytes (max {limit})")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, prepares logging and definitions, and dispatches.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = AcstoreConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    let env_level = env::var(LOG_ENV).ok();
    let directive =
        resolve_log_filter(cli.log_level.as_deref(), env_level.as_deref(), &config.logging.level);
    init_logging(directive, config.logging.ansi)?;

    let definition_files: Vec<PathBuf> =
        config.definitions.files.iter().chain(&cli.definitions).cloned().collect();
    let manager = Arc::new(build_manager(&definition_files)?);
    let profiler = cli.profile.then(|| Arc::new(StorageProfiler::new()));

    let code = match &cli.command {
        Commands::Check(command) => command_check(&config, command)?,
        Commands::Info(command) => command_info(&config, &manager, profiler.as_ref(), command)?,
        Commands::List(command) => command_list(&config, &manager, profiler.as_ref(), command)?,
        Commands::Import(command) => {
            command_import(&config, &manager, profiler.as_ref(), command)?
        }
    };
    if let Some(profiler) = &profiler {
        emit_profile(profiler)?;
    }
    Ok(code)
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Picks the log filter: flag, then environment, then config.
fn resolve_log_filter<'a>(
    flag: Option<&'a str>,
    env_level: Option<&'a str>,
    config_level: &'a str,
) -> &'a str {
    flag.or_else(|| env_level.filter(|level| !level.trim().is_empty())).unwrap_or(config_level)
}

/// Installs the stderr log subscriber.
fn init_logging(directive: &str, ansi: bool) -> CliResult<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|err| CliError::new(format!("invalid log filter {directive}: {err}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .try_init()
        .map_err(|err| CliError::new(format!("failed to install log subscriber: {err}")))
}

/// Registers the container definitions of every file in order.
fn build_manager(files: &[PathBuf]) -> CliResult<AttributeContainersManager> {
    let manager = AttributeContainersManager::new();
    for file in files {
        let definitions = read_definitions_file(file, &manager.schema_helper())
            .map_err(|err| CliError::new(format!("{}: {err}", file.display())))?;
        manager
            .register_attribute_containers(definitions)
            .map_err(|err| CliError::new(format!("{}: {err}", file.display())))?;
    }
    Ok(manager)
}

/// Opens a store with the configured options.
fn open_store(
    config: &AcstoreConfig,
    manager: &Arc<AttributeContainersManager>,
    profiler: Option<&Arc<StorageProfiler>>,
    path: Option<&Path>,
    read_only: bool,
) -> CliResult<SqliteAttributeContainerStore> {
    let sqlite_config =
        config.store.sqlite_config(path, read_only).map_err(|err| CliError::new(err.to_string()))?;
    let store = SqliteAttributeContainerStore::new(Arc::clone(manager));
    store.set_storage_profiler(profiler.cloned());
    store.open(&sqlite_config).map_err(|err| {
        CliError::new(format!("failed to open {}: {err}", sqlite_config.path.display()))
    })?;
    debug!(
        path = %sqlite_config.path.display(),
        read_only = sqlite_config.read_only,
        "cli opened store"
    );
    Ok(store)
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `check`.
fn command_check(config: &AcstoreConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let path = command
        .path
        .clone()
        .or_else(|| config.store.path.clone())
        .ok_or_else(|| CliError::new("store path must be set".to_string()))?;
    if SqliteAttributeContainerStore::check_supported_format(&path) {
        write_stdout_line(&format!("supported: {}", path.display()))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        Ok(ExitCode::SUCCESS)
    } else {
        write_stdout_line(&format!("unsupported: {}", path.display()))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        Ok(ExitCode::FAILURE)
    }
}

/// Executes `info`.
fn command_info(
    config: &AcstoreConfig,
    manager: &Arc<AttributeContainersManager>,
    profiler: Option<&Arc<StorageProfiler>>,
    command: &InfoCommand,
) -> CliResult<ExitCode> {
    let store = open_store(config, manager, profiler, command.path.as_deref(), true)?;
    for line in info_lines(&store, manager)? {
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    store.close().map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Describes the format and container counts of an open store.
fn info_lines(
    store: &SqliteAttributeContainerStore,
    manager: &AttributeContainersManager,
) -> CliResult<Vec<String>> {
    let version =
        store.format_version().map_or_else(|| "unknown".to_string(), |version| version.to_string());
    let mut lines = vec![
        format!("format version: {version}"),
        format!("serialization format: {}", store.serialization_format()),
    ];
    for container_type in manager.container_types() {
        let count = store
            .get_number_of_attribute_containers(&container_type)
            .map_err(|err| CliError::new(err.to_string()))?;
        lines.push(format!("{container_type}: {count}"));
    }
    Ok(lines)
}

/// Executes `list`.
fn command_list(
    config: &AcstoreConfig,
    manager: &Arc<AttributeContainersManager>,
    profiler: Option<&Arc<StorageProfiler>>,
    command: &ListCommand,
) -> CliResult<ExitCode> {
    let store = open_store(config, manager, profiler, command.path.as_deref(), true)?;
    let containers = store
        .get_attribute_containers(&command.container_type, command.filter.as_deref())
        .map_err(|err| CliError::new(err.to_string()))?;
    for container in &containers {
        write_stdout_line(&container.to_json().to_string())
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    store.close().map_err(|err| CliError::new(err.to_string()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `import`.
fn command_import(
    config: &AcstoreConfig,
    manager: &Arc<AttributeContainersManager>,
    profiler: Option<&Arc<StorageProfiler>>,
    command: &ImportCommand,
) -> CliResult<ExitCode> {
    let bytes = read_bytes_with_limit(&command.input, MAX_IMPORT_BYTES).map_err(|err| {
        CliError::new(format!("failed to read {}: {err}", command.input.display()))
    })?;
    let text = String::from_utf8(bytes).map_err(|_| {
        CliError::new(format!("{} must be utf-8", command.input.display()))
    })?;
    let store = open_store(config, manager, profiler, command.path.as_deref(), false)?;
    let imported = import_lines(&store, manager, &command.container_type, &text)?;
    store.close().map_err(|err| CliError::new(err.to_string()))?;
    write_stdout_line(&format!("imported {imported} {} containers", command.container_type))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Adds one container per non-blank JSON line; stops at the first bad line.
fn import_lines(
    store: &dyn AttributeContainerStore,
    manager: &AttributeContainersManager,
    container_type: &str,
    text: &str,
) -> CliResult<u64> {
    let definition =
        manager.definition(container_type).map_err(|err| CliError::new(err.to_string()))?;
    let schema_helper = manager.schema_helper();
    let mut imported = 0_u64;
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;
        let mut container = parse_import_line(line, &definition, &schema_helper)
            .map_err(|message| CliError::new(format!("line {line_number}: {message}")))?;
        store
            .add_attribute_container(&mut container)
            .map_err(|err| CliError::new(format!("line {line_number}: {err}")))?;
        imported += 1;
    }
    debug!(container_type, imported, "imported json lines");
    Ok(imported)
}

/// Parses one import line.
///
/// Lines are either `list` output, whose values sit under `attributes`, or a
/// bare attribute object. Identifiers in the input are ignored.
fn parse_import_line(
    line: &str,
    definition: &ContainerDefinition,
    schema_helper: &SchemaHelper,
) -> Result<AttributeContainer, String> {
    let json: Value = serde_json::from_str(line).map_err(|err| format!("invalid json: {err}"))?;
    let Value::Object(object) = json else {
        return Err("expected a json object".to_string());
    };
    let attributes: &Map<String, Value> = match object.get(ATTRIBUTES_KEY) {
        Some(Value::Object(attributes)) => attributes,
        _ => &object,
    };
    AttributeContainer::from_json_attributes(definition, schema_helper, attributes)
        .map_err(|err| err.to_string())
}

/// Writes the profiler snapshot to stderr as JSON.
fn emit_profile(profiler: &StorageProfiler) -> CliResult<()> {
    let snapshot = serde_json::to_string(&profiler.snapshot())
        .map_err(|err| CliError::new(format!("failed to encode profile: {err}")))?;
    write_stderr_line(&snapshot).map_err(|err| CliError::new(output_error("stderr", &err)))
}

// ============================================================================
// SECTION: I/O Helpers
// ============================================================================

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
