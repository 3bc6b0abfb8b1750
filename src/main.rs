use anyhow::{Context, Result};
use model_downloader::config::{Config, DownloadJob};
use model_downloader::{telemetry, AssetDownloader, HttpFetcher, HttpSettings};
use std::path::Path;

fn main() -> Result<()> {
    // Optional first argument overrides ~/.model-downloader.toml
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(Path::new(&path))?,
        None => Config::load()?,
    };
    println!("✓ Config loaded");

    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("model-downloader starting");

    let jobs = config.download_jobs()?;
    let settings = config.http.settings();
    println!("✓ {} manifest(s) to check", jobs.len());

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let result: Result<()> = runtime.block_on(async move {
        let work = tokio::task::spawn_blocking(move || run(jobs, &settings));

        tokio::select! {
            joined = work => joined.context("download thread panicked").and_then(|outcome| outcome),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                println!("\nInterrupted, partial files are replaced on the next run.");
                Ok(())
            }
        }
    });

    // don't wait for an in-flight blocking download after Ctrl+C
    runtime.shutdown_background();
    result
}

fn run(jobs: Vec<DownloadJob>, settings: &HttpSettings) -> Result<()> {
    let fetcher = HttpFetcher::new(settings)?;
    let mut failed = 0;

    for DownloadJob {
        label,
        root,
        manifest,
    } in jobs
    {
        let downloader = AssetDownloader::with_fetcher(root, manifest, fetcher.clone());
        let report = downloader
            .download_with_progress(|index, total, task| {
                println!(
                    "[{label}] {}/{total} {}",
                    index + 1,
                    task.destination.display()
                );
            })
            .with_context(|| format!("failed to prepare {label}"))?;

        for outcome in report.failed() {
            if let Err(e) = &outcome.result {
                println!("✗ {}: {e}", outcome.destination.display());
            }
        }
        failed += report.failed().count();

        println!(
            "✓ {label}: {} fetched, {} failed",
            report.succeeded().count(),
            report.failed().count()
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed to download, run again to retry");
    }

    tracing::info!("all manifests satisfied");
    Ok(())
}
