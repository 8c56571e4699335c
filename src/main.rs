//! `archive_crawler` binary.
//!
//! Wires the configuration, the HTTP renderer, the crawler and the output
//! writers together. Ctrl-C stops the crawl at the next wait; progress is
//! checkpointed and the partial result is still written.
//!
//! ```sh
//! RUST_LOG=debug archive_crawler https://example.substack.com/archive --show-titles
//! ```

use archive_crawler::checkpoint::CheckpointStore;
use archive_crawler::config::Config;
use archive_crawler::crawler::IncrementalCrawler;
use archive_crawler::logging;
use archive_crawler::models::ArticleRecord;
use archive_crawler::normalizer::{ArticleNormalizer, sort_records};
use archive_crawler::outputs::{self, Columns};
use archive_crawler::parser::ArchiveLinkParser;
use archive_crawler::renderer::HttpArchiveRenderer;
use archive_crawler::utils::{ensure_writable_dir, output_stem};
use clap::Parser;
use std::error::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    // Flushes the log file on drop.
    let _log_guard = logging::init(&config.logging)?;

    let start_time = std::time::Instant::now();
    info!(url = %args.url, "archive_crawler starting up");
    debug!(?config, "Effective configuration");

    // Early check: a crawl is wasted if the result cannot be written.
    if let Err(e) = ensure_writable_dir(&config.output.directory).await {
        error!(
            path = %config.output.directory.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e.into());
    }

    let store = (config.checkpoint.enabled && !args.no_checkpoint)
        .then(|| CheckpointStore::new(&config.checkpoint.directory));
    if let Some(store) = &store {
        if store.exists(&args.url).await {
            if args.resume {
                info!(path = %store.snapshot_path(&args.url).display(), "Checkpoint found; resuming");
            } else {
                warn!("A checkpoint exists for this archive; pass --resume to continue from it");
            }
        }
    }

    let parser = ArchiveLinkParser::with_pattern(&config.parser.link_pattern)?;
    let renderer = HttpArchiveRenderer::new(&config.http_options())?;
    let crawler = IncrementalCrawler::new(
        parser,
        ArticleNormalizer::default(),
        store,
        config.retry_policy(),
        config.crawl_options(args.resume),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            let _ = cancel_tx.send(true);
        }
    });

    let stem = args.output.clone().unwrap_or_else(|| output_stem(&args.url));
    let columns = Columns {
        dates: config.output.include_dates,
        titles: config.output.include_titles,
    };

    let result = crawler.run(&args.url, renderer, cancel_rx).await;
    let outcome = match result {
        Ok(outcome) => {
            info!(
                total = outcome.total,
                new = outcome.new_this_run,
                resumed = outcome.resumed_from,
                cycles = outcome.cycles,
                "Crawl complete"
            );
            write_output(&config, &outcome.records, &stem, columns, args.print).await?;
            save_debug_html(&config, &stem, outcome.final_markup.as_deref()).await;
            Ok(())
        }
        Err(failure) => {
            error!(error = %failure, "Crawl did not complete");
            if !failure.records.is_empty() {
                let partial = sort_records(
                    &failure.records,
                    config.output.sort_by_date,
                    config.output.ascending,
                );
                if let Err(e) = write_output(&config, &partial, &stem, columns, args.print).await {
                    error!(error = %e, "Failed to write partial results");
                }
            }
            save_debug_html(&config, &stem, failure.final_markup.as_deref()).await;
            if failure.checkpoint_saved {
                info!("Run again with --resume to continue");
            }
            Err(Box::new(failure) as Box<dyn Error>)
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    outcome
}

fn apply_overrides(config: &mut Config, args: &Cli) {
    if let Some(threshold) = args.threshold {
        config.crawl.exhaustion_threshold = threshold;
    }
    if args.keep_checkpoint {
        config.checkpoint.clear_on_success = false;
    }
    if let Some(format) = args.format {
        config.output.format = format;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    config.output.include_dates |= args.show_dates;
    config.output.include_titles |= args.show_titles;
    config.output.sort_by_date |= args.sort_by_date;
    config.output.ascending |= args.ascending;
    config.output.debug_html |= args.debug;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    } else if args.debug {
        config.logging.level = "debug".to_string();
    }
    if let Some(file) = &args.log_file {
        config.logging.file = Some(file.clone());
    }
}

async fn write_output(
    config: &Config,
    records: &[ArticleRecord],
    stem: &str,
    columns: Columns,
    print: bool,
) -> Result<(), Box<dyn Error>> {
    let path = outputs::export(
        records,
        config.output.format,
        &config.output.directory,
        stem,
        columns,
    )
    .await?;
    info!(path = %path.display(), count = records.len(), "Saved articles");
    if print {
        outputs::print_to_console(records, columns);
    }
    Ok(())
}

async fn save_debug_html(config: &Config, stem: &str, markup: Option<&str>) {
    let Some(markup) = markup else {
        return;
    };
    if let Err(e) = outputs::write_debug_html(&config.output.directory, stem, markup).await {
        error!(error = %e, "Failed to save debug HTML");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(flags: &[&str]) -> Cli {
        let mut argv = vec!["archive_crawler", "https://example.substack.com/archive"];
        argv.extend_from_slice(flags);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_debug_enables_html_and_debug_logging() {
        let mut config = Config::default();
        apply_overrides(&mut config, &cli(&["--debug", "--log-file", "crawl.log"]));
        assert!(config.output.debug_html);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file.as_deref(), Some(std::path::Path::new("crawl.log")));
    }

    #[test]
    fn test_explicit_log_level_wins_over_debug() {
        let mut config = Config::default();
        apply_overrides(&mut config, &cli(&["--debug", "--log-level", "warn"]));
        assert_eq!(config.logging.level, "warn");

        let mut config = Config::default();
        apply_overrides(&mut config, &cli(&[]));
        assert_eq!(config.logging.level, "info");
        assert!(!config.output.debug_html);
        assert!(config.logging.file.is_none());
    }
}
