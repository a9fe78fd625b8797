//! trialloop - trial-loop runner
//!
//! CLI entry point for running, inspecting and formatting experiment scripts.

use std::io::IsTerminal;
use std::path::Path;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use trialloop::cli::{Cli, Command};
use trialloop::config::Config;
use trialloop::experiment::Experiment;
use trialloop::input::{NullInput, TerminalKeyboard};
use trialloop::r#loop::LoopController;
use trialloop::script::Script;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("{}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn load_script(path: &Path) -> Result<Script> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))?;
    Script::parse(&text).with_context(|| format!("Failed to parse script {}", path.display()))
}

fn load_experiment(path: &Path) -> Result<Experiment> {
    let script = load_script(path)?;
    Experiment::from_script(&script).with_context(|| format!("Failed to build experiment from {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            script,
            item,
            seed,
            dump_state,
        } => cmd_run(&config, &script, item, seed, dump_state),
        Command::Sequence { script, item, seed } => cmd_sequence(&config, &script, &item, seed),
        Command::Describe { script, item } => cmd_describe(&script, item.as_deref()),
        Command::Format { script } => cmd_format(&script),
    }
}

fn cmd_run(config: &Config, path: &Path, item: Option<String>, seed: Option<u64>, dump_state: bool) -> Result<()> {
    debug!(path = %path.display(), ?item, ?seed, dump_state, "cmd_run: called");
    let mut exp = load_experiment(path)?;

    if let Some(seed) = seed.or(config.seed) {
        exp = exp.with_seed(seed);
    }
    if config.flush_input && std::io::stdin().is_terminal() {
        debug!("cmd_run: using terminal keyboard");
        exp = exp.with_input(Box::new(TerminalKeyboard::new()));
    } else {
        exp = exp.with_input(Box::new(NullInput));
    }

    let name = item
        .or_else(|| exp.start())
        .ok_or_else(|| eyre!("No item given and the script sets no 'start' item"))?;

    info!(item = %name, "Running experiment");
    exp.run_item(&name).with_context(|| format!("Failed to run item '{}'", name))?;

    if dump_state {
        println!("{}", serde_json::to_string_pretty(exp.state())?);
    }
    eprintln!("{} Ran item: {}", "✓".green(), name.cyan());
    Ok(())
}

fn cmd_sequence(config: &Config, path: &Path, item: &str, seed: Option<u64>) -> Result<()> {
    debug!(path = %path.display(), %item, ?seed, "cmd_sequence: called");
    let script = load_script(path)?;
    let def = script
        .definition(item)
        .ok_or_else(|| eyre!("No item named '{}' in {}", item, path.display()))?;
    if def.item_type != LoopController::ITEM_TYPE {
        return Err(eyre!("Item '{}' is a {}, not a loop", item, def.item_type));
    }
    let lp = LoopController::from_definition(&def.name, &def.body)?;

    let mut rng = match seed.or(config.seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let trials = lp.sequence(&mut rng)?;
    for trial in &trials {
        println!("{}", trial);
    }
    eprintln!("{} {} trials", "✓".green(), trials.len());
    Ok(())
}

fn cmd_describe(path: &Path, item: Option<&str>) -> Result<()> {
    debug!(path = %path.display(), ?item, "cmd_describe: called");
    let exp = load_experiment(path)?;

    let mut shown = 0;
    for handle in exp.items() {
        let it = handle.borrow();
        if item.is_some_and(|name| name != it.name()) {
            continue;
        }
        shown += 1;
        println!("{} ({})", it.name().cyan(), it.item_type().dimmed());
        for (var, desc) in it.var_info() {
            println!("  {}: {}", var.yellow(), desc);
        }
    }

    if let Some(name) = item
        && shown == 0
    {
        return Err(eyre!("No item named '{}' in {}", name, path.display()));
    }
    Ok(())
}

fn cmd_format(path: &Path) -> Result<()> {
    debug!(path = %path.display(), "cmd_format: called");
    let exp = load_experiment(path)?;
    print!("{}", exp.to_script());
    Ok(())
}
