//! querycsv - export search results to CSV
//!
//! Streams every document matching a query out of Elasticsearch or MongoDB
//! and writes the selected fields to a CSV file.
//!
//! # Usage
//!
//! ```bash
//! querycsv -e http://localhost:9200 -i 'logs-*' -q 'level:error' \
//!     -f @timestamp -f host -f message -o errors.csv
//!
//! querycsv -e mongodb://localhost:27017 -i app.events \
//!     -r '{"status": "failed"}' --fields _id,user.name,status
//! ```

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use querycsv::cli::CliInterface;
use querycsv::error::Result;
use querycsv::export::run_export;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Run the export until it completes, fails or is interrupted
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.print_banner();

    let cancel_token = CancellationToken::new();
    let ctrl_c_handle = tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, stopping export");
                    cancel_token.cancel();
                }
                Err(err) => {
                    eprintln!("Failed to listen for Ctrl+C: {}", err);
                }
            }
        }
    });

    let result = run_export(cli.config(), cancel_token).await;
    ctrl_c_handle.abort();
    let result = result?;

    if !cli.args().quiet {
        println!("Done");
        println!(
            "Exported {} of {} documents ({} skipped) to {} in {} ms",
            result.documents_exported,
            result.total_estimate,
            result.documents_skipped,
            cli.config().export.outfile.display(),
            result.elapsed_ms
        );
    }
    Ok(())
}

/// Initialize logging system based on configuration
///
/// `RUST_LOG` takes precedence over the configured level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
