// crates/proposal-gate-cli/src/main.rs
// ============================================================================
// Module: Proposal Gate CLI Entry Point
// Description: Command dispatcher for the proposal gate server and tooling.
// Purpose: Run the HTTP server and offline config, lock key, and tool queries.
// Dependencies: clap, proposal-gate-config, proposal-gate-core, proposal-gate-server, tokio
// ============================================================================

//! ## Overview
//! The `proposal-gate` binary starts the HTTP server and exposes offline
//! helpers: config validation, the canonical example config, lock key
//! derivation for operators correlating database locks, and a listing of
//! tools with their effective trust tiers. All user-facing strings go
//! through the message catalog.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use proposal_gate_cli::t;
use proposal_gate_config::ProposalGateConfig;
use proposal_gate_config::ServerAuthMode;
use proposal_gate_config::StoreType;
use proposal_gate_config::config_toml_example;
use proposal_gate_core::LockKey;
use proposal_gate_core::TenantId;
use proposal_gate_core::ToolName;
use proposal_gate_core::TrustTier;
use proposal_gate_core::TrustTierPolicy;
use proposal_gate_core::derive_lock_key;
use proposal_gate_server::ProposalGateServer;
use proposal_gate_server::executors::DOCUMENT_TOOLS;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Longest tenant id accepted by `lock-key`.
const MAX_TENANT_ID_LENGTH: usize = 128;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "proposal-gate", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the proposal gate HTTP server.
    Serve(ServeCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Derive the transaction lock key for a tenant resource.
    LockKey(LockKeyCommand),
    /// Tool catalog utilities.
    Tools {
        /// Selected tools subcommand.
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to proposal-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a proposal gate configuration file.
    Validate(ConfigPathArgs),
    /// Print the canonical example configuration.
    Example,
}

/// Shared `--config` argument.
#[derive(Args, Debug)]
struct ConfigPathArgs {
    /// Optional config file path (defaults to proposal-gate.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Arguments for `lock-key`.
#[derive(Args, Debug)]
struct LockKeyCommand {
    /// Tenant that owns the resource.
    #[arg(long, value_name = "TENANT")]
    tenant_id: String,
    /// Resource discriminator (e.g. `storefront:draft`, `catalog:packages`, `balance`).
    #[arg(long, value_name = "RESOURCE")]
    resource: String,
    /// Secondary identifiers appended in order (e.g. a booking id).
    #[arg(long = "secondary", value_name = "ID")]
    secondary: Vec<String>,
}

/// Tools subcommands.
#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// List tools with their effective trust tier and executor availability.
    List(ToolsListCommand),
}

/// Arguments for `tools list`.
#[derive(Args, Debug)]
struct ToolsListCommand {
    /// Optional config file whose trust escalations apply.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

/// Output formats for listing commands.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// Aligned text table.
    Text,
    /// Canonical JSON.
    Json,
}

/// One row of `tools list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ToolRow {
    /// Canonical tool name.
    tool: ToolName,
    /// Effective trust tier.
    tier: TrustTier,
    /// Whether proposals need a human decision.
    requires_approval: bool,
    /// Whether a built-in executor exists.
    executable: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for catalog messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a catalog message.
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Config {
            command,
        } => command_config(command),
        Commands::LockKey(command) => command_lock_key(&command),
        Commands::Tools {
            command,
        } => command_tools(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = ProposalGateConfig::load(command.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    if config.server.auth.mode == ServerAuthMode::LocalOnly {
        write_stderr_line(&t!(
            "serve.warn.local_only_auth",
            tenant = config.server.auth.local_tenant_id
        ))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    }
    let bind = config.server.bind.clone();
    let store = store_label(config.store.store_type);

    let server = tokio::task::spawn_blocking(move || ProposalGateServer::from_config(config))
        .await
        .map_err(|err| {
            CliError::new(t!("serve.init_failed", error = format!("init join failed: {err}")))
        })?
        .map_err(|err| CliError::new(t!("serve.init_failed", error = err)))?;
    write_stderr_line(&t!("serve.listening", bind = bind, store = store))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(t!("serve.failed", error = err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Returns the config label of a store type.
const fn store_label(store_type: StoreType) -> &'static str {
    match store_type {
        StoreType::Memory => "memory",
        StoreType::Sqlite => "sqlite",
    }
}

// ============================================================================
// SECTION: Config Commands
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate(args) => command_config_validate(&args),
        ConfigCommand::Example => {
            write_stdout_line(config_toml_example().trim_end())
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes the config validation command.
fn command_config_validate(args: &ConfigPathArgs) -> CliResult<ExitCode> {
    let _config = ProposalGateConfig::load(args.config.as_deref())
        .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
    write_stdout_line(&t!("config.validate.ok"))
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Lock Key Command
// ============================================================================

/// Executes the `lock-key` command.
fn command_lock_key(command: &LockKeyCommand) -> CliResult<ExitCode> {
    let key = resolve_lock_key(command)?;
    write_stdout_line(&key.to_string())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates lock key arguments and derives the key.
fn resolve_lock_key(command: &LockKeyCommand) -> CliResult<LockKey> {
    let tenant = command.tenant_id.trim();
    if tenant.is_empty() || tenant.len() > MAX_TENANT_ID_LENGTH {
        return Err(CliError::new(t!("lock_key.invalid_tenant")));
    }
    if command.resource.trim().is_empty() {
        return Err(CliError::new(t!("lock_key.invalid_resource")));
    }
    let secondary: Vec<&str> = command.secondary.iter().map(String::as_str).collect();
    Ok(derive_lock_key(&TenantId::new(tenant), &command.resource, &secondary))
}

// ============================================================================
// SECTION: Tools Commands
// ============================================================================

/// Dispatches tools subcommands.
fn command_tools(command: ToolsCommand) -> CliResult<ExitCode> {
    match command {
        ToolsCommand::List(command) => command_tools_list(&command),
    }
}

/// Executes `tools list`.
fn command_tools_list(command: &ToolsListCommand) -> CliResult<ExitCode> {
    let policy = match &command.config {
        Some(path) => {
            let config = ProposalGateConfig::load(Some(path))
                .map_err(|err| CliError::new(t!("config.load_failed", error = err)))?;
            config
                .trust
                .policy()
                .map_err(|err| CliError::new(t!("tools.policy_failed", error = err)))?
        }
        None => TrustTierPolicy::new(),
    };
    let rows = tool_rows(&policy);
    match command.format {
        OutputFormat::Json => {
            let mut bytes = serde_jcs::to_vec(&rows)
                .map_err(|err| CliError::new(t!("output.json_failed", error = err)))?;
            bytes.push(b'\n');
            std::io::stdout()
                .write_all(&bytes)
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
        OutputFormat::Text => {
            write_stdout_line(&render_tool_table(&rows))
                .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds the tool listing under `policy`.
fn tool_rows(policy: &TrustTierPolicy) -> Vec<ToolRow> {
    ToolName::all()
        .iter()
        .map(|tool| ToolRow {
            tool: *tool,
            tier: policy.tier_for(*tool),
            requires_approval: policy.requires_approval(*tool),
            executable: DOCUMENT_TOOLS.contains(tool),
        })
        .collect()
}

/// Renders the tool listing as an aligned table.
fn render_tool_table(rows: &[ToolRow]) -> String {
    let mut lines = vec![format!(
        "{:<26}{:<6}{:<10}{}",
        t!("tools.header.tool"),
        t!("tools.header.tier"),
        t!("tools.header.approval"),
        t!("tools.header.executor"),
    )];
    for row in rows {
        let approval = if row.requires_approval {
            t!("tools.approval.required")
        } else {
            t!("tools.approval.auto")
        };
        let executor = if row.executable {
            t!("tools.executor.present")
        } else {
            t!("tools.executor.missing")
        };
        lines.push(format!(
            "{:<26}{:<6}{:<10}{}",
            row.tool.as_str(),
            row.tier.as_str(),
            approval,
            executor
        ));
    }
    lines.join("\n")
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
