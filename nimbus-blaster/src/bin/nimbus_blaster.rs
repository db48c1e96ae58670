//! nimbus-blaster command-line tool

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::{error, info};

use nimbus_blaster::logging::init_tracing;
use nimbus_blaster::metrics::gather_upload_metrics;
use nimbus_blaster::storage::{delete_key, retrieve};
use nimbus_blaster::{BlasterConfig, ConjoinedUploader, HttpRequester, Result, RetrieveParams};

#[derive(Parser)]
#[command(author, version, about = "Parallel conjoined uploads to nimbus.io", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print upload metrics after the command
    #[arg(long, global = true)]
    metrics: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file as a conjoined object
    Upload {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        file: PathBuf,
        /// Concurrent workers (overrides config)
        #[arg(long)]
        workers: Option<usize>,
        /// Bytes per part (overrides config)
        #[arg(long = "slice-size")]
        slice_size: Option<u64>,
    },
    /// Download an object (or a slice of it) to a file
    Retrieve {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Slice length; 0 reads to the end
        #[arg(long, default_value_t = 0)]
        size: u64,
    },
    /// Delete an object
    Delete {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        key: String,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let show_metrics = cli.metrics;

    let outcome = run(cli).await;

    if show_metrics {
        print!("{}", gather_upload_metrics());
    }

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => BlasterConfig::load_from(path)?,
        None => BlasterConfig::default(),
    };
    config.apply_env()?;

    match cli.command {
        Commands::Upload {
            collection,
            key,
            file,
            workers,
            slice_size,
        } => {
            if let Some(workers) = workers {
                config.upload.worker_count = workers;
                config.upload.queue_depth = workers * 2;
            }
            if let Some(slice_size) = slice_size {
                config.upload.slice_size = slice_size;
            }
            config.validate()?;

            let requester = Arc::new(HttpRequester::new(config.http.clone())?);
            let uploader = ConjoinedUploader::new(requester, config.upload.clone())?;
            let report = uploader.upload(&collection, &key, &file).await?;
            info!(
                "Uploaded {} ({} parts, {} bytes) in {:?}, {:.2} MB/s, conjoined_identifier={}",
                key,
                report.parts,
                report.bytes,
                report.elapsed,
                report.throughput_mbps(),
                report.conjoined_identifier
            );
        }
        Commands::Retrieve {
            collection,
            key,
            output,
            offset,
            size,
        } => {
            config.http.validate()?;
            let requester = HttpRequester::new(config.http.clone())?;
            let params = RetrieveParams::slice(offset, size);

            let mut stream = retrieve(&requester, &collection, &key, &params).await?;
            let mut out = tokio::fs::File::create(&output).await?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            out.flush().await?;
            info!("Retrieved {} ({} bytes) to {}", key, written, output.display());
        }
        Commands::Delete { collection, key } => {
            config.http.validate()?;
            let requester = HttpRequester::new(config.http.clone())?;
            delete_key(&requester, &collection, &key).await?;
            info!("Deleted {}", key);
        }
    }

    Ok(())
}
