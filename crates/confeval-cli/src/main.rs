//! # confeval-cli
//!
//! Command-line interface for confeval.
//!
//! Evaluates the settings script of the current build (and everything it
//! applies), prints its output and diagnostics, and optionally runs tasks
//! registered by the scripts.

mod errors;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use confeval::eval::config::{CONFIG_FILE_NAME, CONFIG_KEYS};
use confeval::{Config, Diagnostic, Evaluator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use errors::enhance_diagnostic;

#[derive(Parser)]
#[command(name = "confeval")]
#[command(about = "Configuration script evaluator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root script to evaluate (default: `settings_file` from the config)
    #[arg(short, long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Fail when deprecation warnings are reported
    #[arg(long, global = true)]
    strict: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Evaluate the configuration and report diagnostics")]
    Check,
    #[command(about = "Evaluate the configuration, then run tasks")]
    Run {
        /// Task names, plain (`compute`) or qualified (`:app:compute`)
        #[arg(value_name = "TASK")]
        tasks: Vec<String>,
    },
    #[command(about = "Get or set configuration values")]
    Config {
        /// Configuration key (e.g., plugin_portal_url, http_timeout)
        key: Option<String>,
        /// Value to set (omit to get current value)
        value: Option<String>,
        /// List all configuration values
        #[arg(short, long)]
        list: bool,
        /// Remove a configuration value
        #[arg(short, long)]
        unset: bool,
        /// Use global config (~/.confevalrc) instead of local (.confevalrc)
        #[arg(short, long)]
        global: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match &cli.command {
        Commands::Check => evaluate(&cli, &[])?,
        Commands::Run { tasks } => evaluate(&cli, tasks)?,
        Commands::Config {
            key,
            value,
            list,
            unset,
            global,
        } => {
            return handle_config(key.clone(), value.clone(), *list, *unset, *global);
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr; `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()
        .ok();
}

/// Evaluates the configuration, runs `tasks`, and returns the exit code.
fn evaluate(cli: &Cli, tasks: &[String]) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let config = Config::load(&cwd).context("Failed to load configuration")?;
    let strict = cli.strict || config.strict_deprecations;

    let root = match &cli.settings {
        Some(path) => cwd.join(path),
        None => config.settings_path(),
    };
    debug!(root = %root.display(), strict, tasks = ?tasks, "resolved root script");

    println!(
        "{} {}",
        "▶".cyan().bold(),
        format!("Evaluating {}...", root.display()).bold()
    );

    let evaluator = Evaluator::new(config);
    let mut result = evaluator.evaluate_configuration(&root);

    for line in &result.model.output {
        println!("{}", line);
    }
    let mut warnings = result.warnings.clone();

    if !result.success {
        report(&warnings);
        report(&result.diagnostics);
        println!("{} {}", "✗".red().bold(), "Configuration failed".red().bold());
        return Ok(1);
    }

    if !tasks.is_empty() {
        let printed = result.model.output.len();
        let outcome = evaluator.run_tasks(&mut result.model, tasks);
        for line in &result.model.output[printed..] {
            println!("{}", line);
        }
        match outcome {
            Ok(task_warnings) => {
                for warning in task_warnings {
                    if !warnings.contains(&warning) {
                        warnings.push(warning);
                    }
                }
            }
            Err(failure) => {
                report(&warnings);
                report(&failure.0);
                println!("{} {}", "✗".red().bold(), "Task failed".red().bold());
                return Ok(1);
            }
        }
    }

    report(&warnings);

    if strict && !warnings.is_empty() {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("{} deprecation warning(s) treated as errors (--strict)", warnings.len()).red().bold()
        );
        return Ok(1);
    }

    let applied = result.scripts.len();
    println!(
        "{} {} {}",
        "✓".green().bold(),
        "Configuration applied".green().bold(),
        format!("{} script(s)", applied).dimmed()
    );
    Ok(0)
}

fn report(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        enhance_diagnostic(diagnostic).display();
    }
}

fn handle_config(
    key: Option<String>,
    value: Option<String>,
    list: bool,
    unset: bool,
    global: bool,
) -> Result<()> {
    let config_path = if global {
        Config::global_config_path().ok_or_else(|| anyhow!("Could not determine home directory"))?
    } else {
        let cwd = std::env::current_dir().context("Failed to determine working directory")?;
        Config::find_local_config(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE_NAME))
    };

    if list {
        return list_config(&config_path, global);
    }

    let key = key.ok_or_else(|| {
        anyhow!(
            "Missing key. Usage:\n  \
            confeval config <key>           - get value\n  \
            confeval config <key> <value>   - set value\n  \
            confeval config --list          - list all values\n  \
            confeval config --unset <key>   - remove value"
        )
    })?;

    if unset {
        return unset_config(&config_path, &key, global);
    }

    if let Some(val) = value {
        set_config(&config_path, &key, &val, global)
    } else {
        get_config(&config_path, &key, global)
    }
}

fn scope(global: bool) -> &'static str {
    if global { "global" } else { "local" }
}

fn read_table(config_path: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
}

fn write_table(config_path: &Path, table: &toml::Table) -> Result<()> {
    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)?;
    }
    let toml_string = toml::to_string_pretty(table)?;
    fs::write(config_path, toml_string).with_context(|| format!("Failed to write {}", config_path.display()))
}

fn display_value(key: &str, value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) if key.contains("token") => {
            let chars: Vec<char> = s.chars().collect();
            if chars.len() > 8 {
                let head: String = chars[..4].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{}...{}", head, tail)
            } else {
                "***".to_string()
            }
        }
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Infers the TOML type of a value given on the command line.
fn parse_value(value: &str) -> toml::Value {
    if let Ok(num) = value.parse::<i64>() {
        toml::Value::Integer(num)
    } else if let Ok(boolean) = value.parse::<bool>() {
        toml::Value::Boolean(boolean)
    } else {
        toml::Value::String(value.to_string())
    }
}

fn list_config(config_path: &Path, global: bool) -> Result<()> {
    if !config_path.exists() {
        println!("{} No {} config file found", "ℹ".cyan(), scope(global));
        println!("  Location: {}", config_path.display());
        return Ok(());
    }

    let table = read_table(config_path)?;
    println!(
        "{} Configuration ({}): {}",
        "⚙".cyan().bold(),
        scope(global),
        config_path.display()
    );
    println!();

    for (key, value) in &table {
        println!("  {} = {}", key.cyan(), display_value(key, value));
    }

    Ok(())
}

fn get_config(config_path: &Path, key: &str, global: bool) -> Result<()> {
    if !config_path.exists() {
        bail!("No {} config file found at {}", scope(global), config_path.display());
    }

    let table = read_table(config_path)?;
    match table.get(key) {
        Some(toml::Value::String(s)) => println!("{}", s),
        Some(value) => println!("{}", display_value(key, value)),
        None => bail!("Config key '{}' not found", key),
    }
    Ok(())
}

fn set_config(config_path: &Path, key: &str, value: &str, global: bool) -> Result<()> {
    set_value(config_path, key, value)?;
    println!(
        "{} Set {} config: {} = {}",
        "✓".green().bold(),
        scope(global),
        key.cyan(),
        value
    );
    println!("  Location: {}", config_path.display());
    Ok(())
}

fn set_value(config_path: &Path, key: &str, value: &str) -> Result<()> {
    if !CONFIG_KEYS.contains(&key) {
        bail!("Unknown config key '{}'. Known keys: {}", key, CONFIG_KEYS.join(", "));
    }

    let mut table = if config_path.exists() {
        read_table(config_path)?
    } else {
        toml::Table::new()
    };
    table.insert(key.to_string(), parse_value(value));

    let content = toml::to_string_pretty(&table)?;
    Config::from_str(&content).with_context(|| format!("Invalid value for '{}'", key))?;
    write_table(config_path, &table)
}

fn unset_config(config_path: &Path, key: &str, global: bool) -> Result<()> {
    if !config_path.exists() {
        bail!("No {} config file found at {}", scope(global), config_path.display());
    }
    unset_value(config_path, key)?;
    println!(
        "{} Removed {} config: {}",
        "✓".green().bold(),
        scope(global),
        key.cyan()
    );
    Ok(())
}

fn unset_value(config_path: &Path, key: &str) -> Result<()> {
    let mut table = read_table(config_path)?;
    if table.remove(key).is_none() {
        bail!("Config key '{}' not found", key);
    }
    write_table(config_path, &table)
}
