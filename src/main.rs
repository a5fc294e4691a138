use anyhow::Result;
use clap::{Parser, Subcommand};
use pickaudit::commands::{backtest, robustness, PipelineOptions};
use pickaudit::config::RunConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pickaudit")]
#[command(about = "Backtests meeting stock picks against a trade ledger and forward prices")]
struct Cli {
    /// Directory of meeting notes (markdown with frontmatter)
    #[arg(long, value_name = "DIR")]
    notes_dir: PathBuf,
    /// Trade ledger JSON file
    #[arg(long, value_name = "PATH")]
    ledger: PathBuf,
    /// Price cache file (omit for an in-memory cache)
    #[arg(long, value_name = "PATH")]
    cache: Option<PathBuf>,
    /// Directory for generated reports
    #[arg(long, value_name = "DIR", default_value = "reports")]
    out_dir: PathBuf,
    /// Ignore previously cached prices
    #[arg(long)]
    no_cache: bool,
    /// Skip all network calls; unpriced legs become missing data
    #[arg(long)]
    offline: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full backtest and write the main report
    Backtest,
    /// Run the robustness suite and write the follow-up report
    Robustness,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let options = PipelineOptions {
        notes_dir: cli.notes_dir,
        ledger_path: cli.ledger,
        cache_path: cli.cache,
        out_dir: cli.out_dir,
        use_cache: !cli.no_cache,
        offline: cli.offline,
        config: RunConfig::default(),
    };

    let path = match cli.command {
        Commands::Backtest => backtest::run(&options)?,
        Commands::Robustness => robustness::run(&options)?,
    };
    println!("Report: {}", path.display());
    Ok(())
}
