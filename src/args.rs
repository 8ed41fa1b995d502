use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "section-crawl")]
#[command(about = "Crawler that collects every record of a paginated catalog")]
#[command(version)]
pub struct Args {
    /// Listing URL to crawl (its filter parameters are kept on every page)
    pub url: String,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Items requested per listing page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Last page to fetch
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Safety cap on the number of records
    #[arg(long)]
    pub max_records: Option<usize>,

    /// Only collect listing summaries, without opening detail pages
    #[arg(long, default_value_t = false)]
    pub summary_only: bool,

    /// Treat the URL as a single sectioned page instead of a listing
    #[arg(long, default_value_t = false)]
    pub section_page: bool,

    /// Write the JSON result here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
