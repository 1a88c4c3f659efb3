mod cli;
mod pipeline;

// remote imports
use crate::cli::Step::*;
use clap::Parser;
use cli::{Cli, TraceLevel};
use dotenv::var;
use std::time::Duration;
use tracing::{subscriber, trace, Level};
use tracing_subscriber::FmtSubscriber;

////////////////////////////////////////////////////////////////////////////

// set the global trace subscriber
fn preprocess(trace_level: Level) {
    let my_subscriber = FmtSubscriber::builder()
        .with_max_level(trace_level)
        .finish();
    subscriber::set_global_default(my_subscriber).expect("Set subscriber");
}

////////////////////////////////////////////////////////////////////////////

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // set the trace level
    if let Some(trace_level) = cli.trace {
        preprocess(match trace_level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::ERROR => Level::ERROR,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::TRACE => Level::TRACE,
            TraceLevel::WARN => Level::WARN,
        });
    }
    trace!("command line input recorded: {cli:?}");

    // if no trace level provided, use tui
    let tui = match cli.trace {
        Some(_) => false,
        None => true,
    };

    // read cli inputs
    use cli::Commands::*;
    match cli.command {
        // `holdump sync <Option<Vec<Step>>>`: run the pipeline
        Sync {
            steps,
            backfill,
            depth,
            deadline,
            dry_run,
        } => {
            let opts = pipeline::RunOptions {
                backfill,
                depth,
                deadline: Duration::from_secs(deadline),
                dry_run,
                tui,
            };

            // if no steps provided, run them all
            match steps {
                Some(steps) => pipeline::run(steps, &opts).await?,
                None => pipeline::run(vec![Institutions, Filings, Holdings], &opts).await?,
            }
        }

        // test env
        Test => {
            let pool = pipeline::connect()?;
            let pg_client = pool.get().await?;
            pg_client.query("SELECT 1", &[]).await?;
            println!("database connection ok");

            match var("USER_AGENT") {
                Ok(identity) => println!("request identity: {identity}"),
                Err(_) => {
                    println!("USER_AGENT is not set; the SEC requires a declared identity")
                }
            }
        }
    }

    Ok(())
}
