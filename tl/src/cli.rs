//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// trialloop - run scripted trial loops
#[derive(Parser, Debug)]
#[command(name = "tl")]
#[command(author, version, about = "Trial-loop runner for scripted experiments", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run an item of a script (the `start` item by default)
    Run {
        /// Experiment script
        #[arg(required = true)]
        script: PathBuf,

        /// Item to run instead of `start`
        #[arg(short, long)]
        item: Option<String>,

        /// Seed for all random draws
        #[arg(short, long)]
        seed: Option<u64>,

        /// Print the final variable state as JSON
        #[arg(long)]
        dump_state: bool,
    },

    /// Print the trial sequence a loop would run
    Sequence {
        /// Experiment script
        #[arg(required = true)]
        script: PathBuf,

        /// Loop item name
        #[arg(short, long, required = true)]
        item: String,

        /// Seed for all random draws
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Show the variables each item sets or uses
    Describe {
        /// Experiment script
        #[arg(required = true)]
        script: PathBuf,

        /// Only describe this item
        #[arg(short, long)]
        item: Option<String>,
    },

    /// Re-serialize a script in canonical form
    Format {
        /// Experiment script
        #[arg(required = true)]
        script: PathBuf,
    },
}
