use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use line_shard::config::{DEFAULT_LIMIT, DEFAULT_MAX_STORE};
use line_shard::{Delimiter, SplitConfig, SplitEvent, TextFileSplitter};
use tokio::sync::mpsc;
use tracing::error;

#[derive(Parser)]
#[command(name = "line-shard")]
#[command(about = "Split a large text file into files of at most N lines", long_about = None)]
struct Args {
    /// File to split
    source: PathBuf,

    /// Directory receiving the shards (created if missing)
    target: PathBuf,

    /// Maximum lines per shard
    #[arg(long, short = 'l', env = "LINE_SHARD_LIMIT", default_value_t = DEFAULT_LIMIT)]
    limit: u64,

    /// Read chunk size in bytes
    #[arg(long, env = "LINE_SHARD_MAX_STORE", default_value_t = DEFAULT_MAX_STORE)]
    max_store: usize,

    /// Line delimiter; accepts \n, \r, \t and \0 escapes
    #[arg(long, short = 'd', default_value = "\\n")]
    delimiter: String,

    /// Retries when a shard file cannot be created
    #[arg(long, default_value_t = 0)]
    sink_retries: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = SplitConfig::new(args.source, args.target)
        .limit(args.limit)
        .max_store(args.max_store)
        .delimiter(Delimiter::parse_escaped(&args.delimiter))
        .sink_retries(args.sink_retries);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                SplitEvent::FileCreated { file_name } => println!("{}", file_name),
                SplitEvent::Complete { file_count } => {
                    println!("Done: {} file(s) created", file_count)
                }
            }
        }
    });

    let mut splitter = TextFileSplitter::new(config).with_events(tx);
    let result = splitter.start().await;
    // Closes the event channel so the printer can finish.
    drop(splitter);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer stopped early");
    }

    match result {
        Ok(Some(summary)) => {
            tracing::info!(
                files = summary.file_count(),
                lines = summary.total_lines,
                "Finished"
            );
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
