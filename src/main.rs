// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rangefetch::config::DEFAULT_USER_AGENT;
use rangefetch::planner::MAX_CHUNKS;
use rangefetch::prelude::*;
use rangefetch::{logging, process};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Download a single HTTP resource as parallel byte ranges.
#[derive(Debug, Parser)]
#[command(name = "rangefetch", version)]
struct Cli {
    /// URL of the resource.
    #[arg(required_unless_present = "worker")]
    url: Option<String>,

    /// Where the merged file is written.
    #[arg(default_value = "downloaded_file")]
    output: PathBuf,

    /// Number of chunks downloaded in parallel.
    #[arg(default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=MAX_CHUNKS as i64))]
    threads: u8,

    /// Run the chunk workers in a child process and only monitor from here.
    #[arg(long)]
    process: bool,

    /// Directory for the part_<n>.tmp files.
    #[arg(long, default_value = ".")]
    temp_dir: PathBuf,

    /// Expected SHA-256 of the result, checked after the size.
    #[arg(long, value_name = "HEX")]
    sha256: Option<String>,

    /// Progress poll interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,

    #[arg(short, long)]
    verbose: bool,

    /// Read a download request from stdin and report on stdout.
    #[arg(long, hide = true)]
    worker: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{e}");
    }

    let outcome = if cli.worker {
        run_worker().await
    } else {
        run_download(&cli).await
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_worker() -> Result<ExitCode> {
    let transport = Arc::new(ReqwestTransport::new(DEFAULT_USER_AGENT)?);
    let results = process::serve_worker(transport, tokio::io::stdin(), tokio::io::stdout()).await?;
    if results.iter().all(ChunkResult::is_success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_download(cli: &Cli) -> Result<ExitCode> {
    let url = cli.url.as_deref().context("missing URL")?;
    let model = if cli.process {
        ConcurrencyModel::Process(
            WorkerCommand::current_exe().context("cannot locate the running executable")?,
        )
    } else {
        ConcurrencyModel::Threads
    };
    let options = DownloadOptions {
        threads: usize::from(cli.threads),
        temp_dir: cli.temp_dir.clone(),
        poll_interval: Duration::from_millis(cli.poll_ms),
        model,
        expected_sha256: cli.sha256.clone(),
        ..DownloadOptions::default()
    };
    options.validate()?;

    println!("=== rangefetch ===");
    println!("URL: {}", url);
    println!("Output: {}", cli.output.display());
    println!("Threads: {}{}", options.threads, if cli.process { " (worker process)" } else { "" });

    let transport = Arc::new(ReqwestTransport::new(&options.user_agent)?);

    let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::with_template("{wide_bar} {bytes}/{total_bytes} ({percent}%) {bytes_per_sec}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    let ticker = bar.clone();

    let mut orchestrator = Orchestrator::new(transport, options).on_progress(move |snap| {
        ticker.set_length(snap.total);
        ticker.set_position(snap.current);
    });
    let outcome = orchestrator.run(url, &cli.output).await;
    bar.finish_and_clear();
    let report = outcome?;

    println!("Done! Saved as: {}", report.output.display());
    println!(
        "Expected: {} bytes, Got: {} bytes",
        report.target.total_size,
        report.actual_size()
    );
    if report.verification.is_match() {
        println!("File OK!");
    } else {
        println!("Size mismatch!");
    }
    match report.checksum_ok {
        Some(true) => println!("SHA-256 OK"),
        Some(false) => println!("SHA-256 mismatch!"),
        None => {}
    }

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Failed chunks: {:?}", report.failed_chunks());
        Ok(ExitCode::FAILURE)
    }
}
