use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use lodestone::{config, driver, LodestoneError};

/// Transfers surface fields between non-matching discretizations
#[derive(Parser)]
#[command(name = "lodestone")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Surface field transfer for coupled analyses", long_about = None)]
struct Cli {
    /// Input deck (json)
    input: String,

    /// Directory the transfer files are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// File name prefix of the transfer files
    #[arg(short, long, default_value = "transfer")]
    prefix: String,

    /// CSV file for located query points
    #[arg(long, default_value = "queries.csv")]
    queries_output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: unable to install log subscriber");
    }

    let result = config::load_input_file(&cli.input)
        .and_then(|deck| driver::run(&deck, &cli.output_dir, &cli.prefix, &cli.queries_output));

    match result {
        Ok(summary) => {
            info!(
                "transferred {} points and {} elements into {} file(s)",
                summary.written_nodes,
                summary.written_elements,
                summary.transfer_files.len()
            );
            if summary.extrapolated_queries > 0 {
                warn!("{} query points were extrapolated", summary.extrapolated_queries);
            }
        }
        Err(LodestoneError::NotFound(msg)) => {
            warn!("nothing to transfer: {msg}");
        }
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    }
}
