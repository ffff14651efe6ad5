mod cli;
mod judge;
mod report;
mod results;
mod run;
mod world;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use engine::exit_codes;

use crate::run::RunOptions;

#[derive(Parser)]
#[command(name = "eval", version, about = "Replay agent transcripts through the action engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay recorded agent replies for every task in a dataset.
    Run {
        #[arg(long)]
        dataset: PathBuf,
        #[arg(long)]
        transcripts: PathBuf,
        /// Engine config (TOML); defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "results")]
        out: PathBuf,
        /// Continue from `<out>/checkpoint.json` instead of starting over.
        #[arg(long)]
        resume: bool,
    },
    /// Parse agent text from stdin and print the directive as JSON.
    Parse,
    /// Summarize the task reports in a results directory.
    Report { dir: PathBuf },
}

fn main() {
    engine::logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run {
            dataset,
            transcripts,
            config,
            out,
            resume,
        } => cli::run(&RunOptions {
            dataset,
            transcripts,
            config,
            out,
            resume,
        }),
        Command::Parse => cli::parse_stdin(),
        Command::Report { dir } => cli::report(&dir),
    };
    let code = result.unwrap_or_else(|err| {
        eprintln!("error: {err:#}");
        exit_codes::INVALID
    });
    std::process::exit(code);
}
