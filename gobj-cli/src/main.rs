//! # yuno CLI
//!
//! Builds a gobj tree from a YAML config file and inspects it.

mod classes;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "yuno")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "yuno.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the tree, start and play the services, print the tree
    Tree,

    /// Describe the registered classes
    Classes,

    /// Run a command line on an object
    Command {
        /// Object path, e.g. `counter` or `demo`counter`
        path: String,

        /// Command line, e.g. "tick times=3"
        line: String,

        /// Extra parameters as a JSON object
        #[arg(long)]
        kw: Option<String>,
    },

    /// Print the statistics of an object
    Stats {
        /// Object path
        path: String,

        /// Attribute name or prefix; `__reset__` resets the counters
        #[arg(default_value = "")]
        selector: String,
    },

    /// Send an event to an object, then print its statistics
    Send {
        /// Object path
        path: String,

        /// Event name
        event: String,

        /// Event parameters as a JSON object
        #[arg(long)]
        kw: Option<String>,

        /// Number of times to send the event
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut rt = commands::boot(&cli.config)?;
    let result = match cli.command {
        Commands::Tree => commands::tree(&mut rt),
        Commands::Classes => commands::classes(&rt),
        Commands::Command { path, line, kw } => {
            commands::command(&mut rt, &path, &line, kw.as_deref())
        }
        Commands::Stats { path, selector } => commands::stats(&mut rt, &path, &selector),
        Commands::Send {
            path,
            event,
            kw,
            count,
        } => commands::send(&mut rt, &path, &event, kw.as_deref(), count),
    };
    rt.end();
    result
}
