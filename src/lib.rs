//! # Archive Crawler
//!
//! Collects the article links (with titles and publication dates, when the
//! page shows them) of an infinite-scroll archive, such as a Substack
//! `/archive` page.
//!
//! ## Architecture
//!
//! 1. **Rendering**: a [`renderer::PageRenderer`] loads the archive and
//!    scrolls it, one cycle at a time
//! 2. **Extraction**: [`parser::ArchiveLinkParser`] turns markup into candidates
//! 3. **Normalization**: [`normalizer::ArticleNormalizer`] canonicalizes URLs,
//!    parses dates and drops duplicates
//! 4. **Checkpointing**: [`checkpoint::CheckpointStore`] snapshots progress so
//!    an interrupted crawl can resume
//! 5. **Orchestration**: [`crawler::IncrementalCrawler`] runs the cycle until
//!    the archive stops growing
//! 6. **Output**: [`outputs`] writes txt, csv or json

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod error;
pub mod logging;
pub mod models;
pub mod normalizer;
pub mod outputs;
pub mod parser;
pub mod renderer;
pub mod utils;
