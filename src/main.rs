//! Command-line front end for the HTTP service.
//!
//! Submits every URL concurrently through one service and prints each
//! response as it becomes available.
//!
//! ```text
//! http-service https://example.com http://localhost:3000/health
//! http-service --post '{"a":1}' http://localhost:3000/echo
//! http-service --callback --config service.toml http://a http://b
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;

use clap::Parser;

use http_service::config::{load_config, ServiceConfig};
use http_service::observability::init_logging;
use http_service::{HttpService, Response};

#[derive(Parser)]
#[command(name = "http-service")]
#[command(about = "Fetch URLs concurrently through one multiplexed worker", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// POST this JSON body instead of sending GET requests
    #[arg(short, long)]
    post: Option<String>,

    /// Receive responses through callbacks instead of deferred handles
    #[arg(long)]
    callback: bool,

    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every request succeeded.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    init_logging(&config.observability);

    tracing::info!(
        urls = cli.urls.len(),
        max_connections = config.transport.max_connections,
        "Configuration loaded"
    );

    let service = HttpService::new(config)?;
    let mut all_ok = true;

    if cli.callback {
        let (tx, rx) = mpsc::channel();
        let mut submitted = 0;
        for url in &cli.urls {
            let tx = tx.clone();
            let label = url.clone();
            let on_done = move |response: Response| {
                let _ = tx.send((label, response));
            };
            let result = match &cli.post {
                Some(body) => service.post_with(url, body.as_str(), on_done),
                None => service.get_with(url, on_done),
            };
            match result {
                Ok(()) => submitted += 1,
                Err(e) => {
                    eprintln!("{url}: {e}");
                    all_ok = false;
                }
            }
        }
        drop(tx);

        for (url, response) in rx.iter().take(submitted) {
            all_ok &= print_response(&url, &response);
        }
    } else {
        let mut pending = Vec::new();
        for url in &cli.urls {
            let submitted = match &cli.post {
                Some(body) => service.post(url, body.as_str()),
                None => service.get(url),
            };
            match submitted {
                Ok(deferred) => pending.push((url, deferred)),
                Err(e) => {
                    eprintln!("{url}: {e}");
                    all_ok = false;
                }
            }
        }

        for (url, deferred) in pending {
            match deferred.wait() {
                Ok(response) => all_ok &= print_response(url, &response),
                Err(e) => {
                    eprintln!("{url}: {e}");
                    all_ok = false;
                }
            }
        }
    }

    service.shutdown()?;
    Ok(all_ok)
}

fn print_response(url: &str, response: &Response) -> bool {
    let status = response
        .status
        .map_or_else(|| "---".to_string(), |s| s.to_string());
    println!("{status} {url} ({} bytes)", response.body.len());
    if let Some(reason) = &response.failure {
        println!("  failed: {reason}");
    }
    if !response.body.is_empty() {
        println!("{}", response.text());
    }
    response.is_success()
}
