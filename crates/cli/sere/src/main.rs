//! Sere compiler CLI
//!
//! Main entry point for the Sere compiler toolchain

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use sr_driver::Target;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod build;
mod check;
mod options;
mod report;
mod run;

#[derive(Parser)]
#[command(name = "sere")]
#[command(about = "Sere compiler toolchain", long_about = None)]
#[command(version)]
struct Cli {
    /// Log pipeline events at debug level (overrides SERE_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that runs the generator
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
    /// Stop before code generation when analysis reports errors
    #[arg(long)]
    strict: bool,

    /// Options file; defaults to a sere.toml next to the source
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the structural check of the generated module
    #[arg(long)]
    no_verify: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to IR, an object file or assembly
    Build {
        /// Source file
        source: PathBuf,

        /// Output path without extension; defaults to the source path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Artifact kind (ir, obj or asm)
        #[arg(long)]
        target: Option<Target>,

        /// Optimisation level for the native backend
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
        opt_level: Option<u8>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Parse and analyze a source file
    Check {
        /// Source file
        source: PathBuf,

        /// Print the errors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a source file and execute it with the interpreter
    Run {
        /// Source file
        source: PathBuf,

        /// Call this function instead of running the top-level code
        #[arg(long)]
        function: Option<String>,

        /// Integer argument for --function, repeatable
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<i32>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        Some(EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_env("SERE_LOG").ok()
    };
    if let Some(filter) = filter {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
        tracing::debug!("tracing initialized");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Build {
            source,
            output,
            target,
            opt_level,
            pipeline,
        } => build::build(&source, output, target, opt_level, &pipeline),
        Commands::Check { source, json } => check::check(&source, json),
        Commands::Run {
            source,
            function,
            args,
            pipeline,
        } => run::run(&source, function.as_deref(), &args, &pipeline),
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{} {error:?}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
