use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Sets the level of tracing.
    #[arg(short, long, global = true)]
    pub trace: Option<TraceLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull 13F-HR filing data into the PostgreSQL database (holdump).
    Sync {
        /// Specify the pipeline steps to run.
        ///
        /// If no steps are provided, sync runs all of them in order.
        #[arg(short, long)]
        steps: Option<Vec<Step>>,

        /// How many recent filings per institution get their holdings
        /// breakdown re-derived.
        #[arg(short, long)]
        backfill: usize,

        /// How many recent filings to sync per institution.
        #[arg(short, long, default_value_t = 1)]
        depth: usize,

        /// Per-institution time limit, in seconds.
        #[arg(long, default_value_t = 180)]
        deadline: u64,

        /// Run against an in-memory store and report what would be written.
        #[arg(long)]
        dry_run: bool,
    },

    /// Environment check; confirms the database and identity settings.
    Test,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    DEBUG,
    ERROR,
    INFO,
    TRACE,
    WARN,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Refresh the tracked-institution profiles.
    Institutions,

    /// Sync each institution's latest filings.
    Filings,

    /// Re-derive per-filing holdings breakdowns.
    Holdings,
}
