use clap::Parser;
use section_crawl::{Crawl, CrawlConfig, monitor};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    ::log::info!("Starting crawl of {}", args.url);
    eprintln!("Note: Crawling requires a WebDriver server (e.g., ChromeDriver).");
    eprintln!(
        "Set WEBDRIVER_URL environment variable if not using the default http://localhost:4444"
    );

    let crawl = match build_crawl(&args) {
        Ok(crawl) => crawl,
        Err(e) => {
            ::log::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let start_time = std::time::Instant::now();

    if args.section_page {
        match crawl.run_section_page(&args.url).await {
            Ok(record) => write_output(&args, &record),
            Err(e) => {
                ::log::error!("Failed to scrape {}: {}", args.url, e);
                std::process::exit(1);
            }
        }
        return;
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::warn!("Interrupt received, stopping after the current item");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let outcome = match crawl.with_interrupt(interrupt).run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            ::log::error!("Failed to start crawl: {}", e);
            std::process::exit(1);
        }
    };

    ::log::info!(
        "Crawl finished with {} records from {} pages in {:.2} seconds",
        outcome.records.len(),
        outcome.pages_fetched,
        start_time.elapsed().as_secs_f64()
    );
    for change in monitor::diff(&outcome.records) {
        ::log::debug!(
            "Status changes from {} to {} at record {}",
            change.previous,
            change.current,
            change.position
        );
    }
    if outcome.possibly_incomplete {
        ::log::warn!(
            "Results may be incomplete: stopped because of {:?}",
            outcome.stop_reason
        );
    }

    write_output(&args, &outcome);
}

fn build_crawl(args: &Args) -> section_crawl::Result<Crawl> {
    let mut crawl = Crawl::with_config(CrawlConfig::new(&args.url));
    if let Some(path) = &args.config {
        crawl = crawl.with_config_file(path)?;
    }
    if let Some(page_size) = args.page_size {
        crawl = crawl.with_page_size(page_size);
    }
    if let Some(max_pages) = args.max_pages {
        crawl = crawl.with_max_pages(max_pages);
    }
    if let Some(max_records) = args.max_records {
        crawl = crawl.with_max_records(max_records);
    }
    if args.summary_only {
        crawl = crawl.summary_only();
    }
    Ok(crawl)
}

fn write_output<T: Serialize>(args: &Args, value: &T) {
    let json = match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => {
            ::log::error!("Failed to serialize results: {}", e);
            std::process::exit(1);
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, json) {
                ::log::error!("Failed to write {}: {}", path.display(), e);
                std::process::exit(1);
            }
            ::log::info!("Results written to {}", path.display());
        }
        None => println!("{}", json),
    }
}
