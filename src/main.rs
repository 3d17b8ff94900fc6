//! compute-vm CLI entrypoint.
//!
//! This is the main entrypoint for the compute-vm command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use compute_vm::cli::{Cli, Commands, OutputFormatter};
use compute_vm::config::{ConfigHasher, ConfigParser, ConfigValidator, InstanceConfig, find_config_file};
use compute_vm::error::{Result, VmError};
use compute_vm::resolver::{DecisionSet, ModuleOutputs, resolve};

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    let formatter = OutputFormatter::new(cli.output);

    match run(cli, &formatter) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e));
            if e.is_input_error() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Dispatches the selected command.
fn run(cli: Cli, formatter: &OutputFormatter) -> Result<()> {
    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, formatter),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, formatter),
        Commands::Outputs => cmd_outputs(cli.config.as_ref(), formatter),
    }
}

/// Writes a starter configuration.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing compute-vm configuration in: {}", path.display());

    let config_path = path.join("compute-vm.yaml");
    let env_path = path.join(".env.example");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Configuration file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/compute-vm.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    eprintln!("\nConfiguration initialized!");
    eprintln!("Next steps:");
    eprintln!("  1. Edit compute-vm.yaml with your project, zone and network");
    eprintln!("  2. Run 'compute-vm validate' to check your configuration");
    eprintln!("  3. Run 'compute-vm plan' to see the resources it resolves to");

    Ok(())
}

/// Validates configuration and checks that it resolves.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;

    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;
    let decisions = resolve(&config)?;

    emit(&formatter.format_validation(&result, &decisions, show_warnings)?)
}

/// Shows the resolved decision set.
fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let decisions = load_and_resolve(config_path)?;

    let hasher = ConfigHasher::new();
    let fingerprint = hasher.hash_decisions(&decisions)?;
    debug!("Decision set fingerprint: {}", hasher.short_hash(&fingerprint));

    emit(&formatter.format_plan(&decisions, &fingerprint, detailed)?)
}

/// Shows the values known before materialization.
fn cmd_outputs(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let decisions = load_and_resolve(config_path)?;
    emit(&formatter.format_outputs(&ModuleOutputs::from_decisions(&decisions))?)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env`, the configuration file and environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<InstanceConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| Path::new(".")),
    );
    parser.load_dotenv()?;

    parser.load_with_env(&config_file)
}

/// Loads, validates and resolves the configuration.
fn load_and_resolve(config_path: Option<&PathBuf>) -> Result<DecisionSet> {
    let config = load_config(config_path)?;
    ConfigValidator::new().validate(&config)?;
    Ok(resolve(&config)?)
}

/// Writes a rendered result to stdout.
fn emit(rendered: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}").map_err(VmError::from)
}
