// ABOUTME: CLI binary for the trawl catalog extraction engine.
// ABOUTME: Routes a catalog URL through a site file, walks it over HTTP and prints records as JSON.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use trawl::{config, DriverFactory, HarvestError, HttpDriverFactory, Router, TeaserReference};

#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(about = "Extract structured records from a web catalog")]
struct Args {
    /// Site configuration file (JSON)
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Listing pages to follow: 1 = start page only, 0 = until no next page
    #[arg(short = 'd', long = "depth", default_value_t = 1)]
    depth: u32,

    /// Concurrent item workers
    #[arg(short = 'w', long = "workers", default_value_t = 4)]
    workers: usize,

    /// Print the collected teasers instead of harvesting items
    #[arg(long = "teasers")]
    teasers: bool,

    /// With --teasers, print them base64-encoded
    #[arg(long = "base64", requires = "teasers")]
    base64: bool,

    /// Output file path (default: stdout)
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Print elapsed time in ms to stderr
    #[arg(long = "timing")]
    timing: bool,

    /// Catalog URL to walk
    #[arg()]
    url: String,
}

async fn run(args: &Args) -> Result<serde_json::Value, HarvestError> {
    let router: Router = config::load_router(&args.config)?;
    let drivers: Arc<dyn DriverFactory> = Arc::new(
        HttpDriverFactory::new()
            .map_err(|e| HarvestError::driver(args.url.as_str(), "Open", Some(e.into())))?,
    );

    let mut walker = router.catalog(&args.url, args.depth, Arc::clone(&drivers))?;
    walker.walk(&args.url).await?;

    if args.teasers {
        let teasers: Vec<String> = walker
            .list_teasers(args.base64)
            .into_iter()
            .map(|t| match t {
                TeaserReference::Encoded(s) => s,
                TeaserReference::Node(n) => n.html().to_string(),
            })
            .collect();
        return Ok(serde_json::Value::from(teasers));
    }

    let aggregator = router.aggregator(&args.url, drivers)?;
    let records = walker.mine(&aggregator, args.workers).await?;
    serde_json::to_value(&records)
        .map_err(|e| HarvestError::invalid_state(args.url.as_str(), "Output", e))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let start = Instant::now();
    let output = run(&args).await;
    let elapsed = start.elapsed();

    let mut had_error = false;
    match output {
        Ok(value) => {
            let output_str = serde_json::to_string_pretty(&value).unwrap_or_default();
            if let Some(output_path) = &args.output {
                if let Err(e) = fs::write(output_path, &output_str) {
                    eprintln!("error writing to {:?}: {}", output_path, e);
                    had_error = true;
                }
            } else {
                println!("{}", output_str);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            had_error = true;
        }
    }

    if args.timing {
        let _ = writeln!(io::stderr(), "elapsed: {}ms", elapsed.as_millis());
    }

    if had_error {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
