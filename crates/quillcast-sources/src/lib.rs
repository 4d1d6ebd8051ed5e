pub mod aggregate;
pub mod client;
pub mod error;
pub mod runner;

pub use aggregate::aggregate_sources;
pub use client::{PageFetcher, ScrapeClient, ScrapedPage};
pub use error::SourceError;
pub use runner::{
    fetch_and_analyze_sources, usable_candidates, BatchConfig, SourceAnalyzer,
    INSUFFICIENT_CONTENT, MIN_CONTENT_CHARS, PARTIAL_EXCERPT_CHARS, SUCCESS_EXCERPT_CHARS,
};
