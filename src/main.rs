use anyhow::Result;
use clap::{Parser, Subcommand};
use knit_weaver::cli::{diff_dumps, inspect_class, print_report, run_weave};
use knit_weaver::config::{ClassFormat, ConfigLoader, WeaveOverrides};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "knit-weaver", version, about = "Compile-time dependency injection weaver")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Weave every class under the input directories
    Weave {
        /// Config file (defaults to ./knit.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Program input directory (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<PathBuf>,
        /// Classpath-only directory (repeatable)
        #[arg(short = 'l', long = "library")]
        libraries: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the graph dump here
        #[arg(long)]
        dump: Option<PathBuf>,
        /// Write the change feed here
        #[arg(long)]
        change_feed: Option<PathBuf>,
        /// Dump of the previous run, compared against for the change feed
        #[arg(long)]
        previous_dump: Option<PathBuf>,
        #[arg(short = 'j', long)]
        threads: Option<usize>,
        /// Class entry format
        #[arg(long, value_enum)]
        format: Option<ClassFormat>,
    },
    /// Decode one class entry (either format) and print it as JSON
    Inspect { file: PathBuf },
    /// Print the change feed between two graph dumps
    Diff { previous: PathBuf, current: PathBuf },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Weave {
            config,
            inputs,
            libraries,
            output,
            dump,
            change_feed,
            previous_dump,
            threads,
            format,
        } => {
            let mut loader = ConfigLoader::new();
            if let Some(path) = config {
                loader = loader.with_config_path(path);
            }
            let config = loader.load(&WeaveOverrides {
                inputs,
                libraries,
                output,
                dump,
                change_feed,
                previous_dump,
                threads,
                format,
            })?;
            let report = run_weave(&config)?;
            print_report(&report)
        }
        Command::Inspect { file } => inspect_class(&file),
        Command::Diff { previous, current } => diff_dumps(&previous, &current),
    }
}
