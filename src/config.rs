//! YAML or JSON configuration with defaults for every key.
//!
//! The format follows the file extension (`.yaml`/`.yml` or `.json`).
//! A missing file is not an error; the defaults describe a polite crawl of a
//! Substack archive. Any subset of keys may be given:
//!
//! ```yaml
//! crawl:
//!   exhaustion_threshold: 4
//!   scroll_wait: { min_secs: 2.0, max_secs: 5.0 }
//! retry:
//!   max_attempts: 5
//! output:
//!   format: csv
//!   sort_by_date: true
//! ```

use crate::crawler::{CrawlOptions, WaitRange};
use crate::error::ConfigError;
use crate::outputs::OutputFormat;
use crate::parser::{ArchiveLinkParser, DEFAULT_LINK_PATTERN};
use crate::renderer::RetryPolicy;
use crate::renderer::http::HttpRendererOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawl: CrawlSection,
    pub retry: RetrySection,
    pub http: HttpSection,
    pub parser: ParserSection,
    pub checkpoint: CheckpointSection,
    pub output: OutputSection,
    pub logging: LoggingSection,
}

/// Randomized wait bounds in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitSection {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl WaitSection {
    fn to_range(self) -> WaitRange {
        WaitRange::new(
            Duration::from_secs_f64(self.min_secs),
            Duration::from_secs_f64(self.max_secs),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    /// Consecutive unchanged cycles before the archive counts as exhausted.
    pub exhaustion_threshold: u32,
    /// Wait after the first page load.
    pub initial_wait: WaitSection,
    /// Wait after every scroll.
    pub scroll_wait: WaitSection,
    /// Save a checkpoint every N cycles.
    pub checkpoint_every: u32,
    pub max_cycles: Option<u32>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            exhaustion_threshold: 3,
            initial_wait: WaitSection {
                min_secs: 3.0,
                max_secs: 6.0,
            },
            scroll_wait: WaitSection {
                min_secs: 3.0,
                max_secs: 6.0,
            },
            checkpoint_every: 1,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub user_agent: String,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            page_size: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    /// Regex matched against the path of every resolved link.
    pub link_pattern: String,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            link_pattern: DEFAULT_LINK_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Delete the checkpoint once the archive is exhausted.
    pub clear_on_success: bool,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from(".checkpoints"),
            clear_on_success: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub format: OutputFormat,
    pub directory: PathBuf,
    pub include_dates: bool,
    pub include_titles: bool,
    pub sort_by_date: bool,
    pub ascending: bool,
    /// Save the last rendered document next to the results.
    pub debug_html: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: OutputFormat::Txt,
            directory: PathBuf::from("output"),
            include_dates: false,
            include_titles: false,
            sort_by_date: false,
            ascending: false,
            debug_html: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Also append plain-text logs to this file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load `path`, falling back to defaults when it is `None` or missing.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase);
                let config = match extension.as_deref() {
                    Some("json") => Self::from_json(&text).map_err(|source| ConfigError::ParseJson {
                        path: path.to_path_buf(),
                        source,
                    })?,
                    Some("yaml" | "yml") | None => {
                        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
                            path: path.to_path_buf(),
                            source,
                        })?
                    }
                    Some(_) => {
                        return Err(ConfigError::UnsupportedFormat {
                            path: path.to_path_buf(),
                        });
                    }
                };
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Some(path) => {
                info!(path = %path.display(), "Config file not found; using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.exhaustion_threshold == 0 {
            return Err(invalid("crawl.exhaustion_threshold", "must be at least 1"));
        }
        if self.crawl.checkpoint_every == 0 {
            return Err(invalid("crawl.checkpoint_every", "must be at least 1"));
        }
        if self.crawl.max_cycles == Some(0) {
            return Err(invalid("crawl.max_cycles", "must be at least 1 when set"));
        }
        for (key, wait) in [
            ("crawl.initial_wait", self.crawl.initial_wait),
            ("crawl.scroll_wait", self.crawl.scroll_wait),
        ] {
            let finite = wait.min_secs.is_finite() && wait.max_secs.is_finite();
            if !finite || wait.min_secs < 0.0 || wait.min_secs > wait.max_secs {
                return Err(invalid(key, "needs 0 <= min_secs <= max_secs"));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.http.page_size == 0 {
            return Err(invalid("http.page_size", "must be at least 1"));
        }
        if let Err(e) = ArchiveLinkParser::with_pattern(&self.parser.link_pattern) {
            return Err(ConfigError::Invalid {
                key: "parser.link_pattern",
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    pub fn crawl_options(&self, resume: bool) -> CrawlOptions {
        CrawlOptions {
            resume,
            exhaustion_threshold: self.crawl.exhaustion_threshold,
            initial_wait: self.crawl.initial_wait.to_range(),
            scroll_wait: self.crawl.scroll_wait.to_range(),
            checkpoint_every: self.crawl.checkpoint_every,
            max_cycles: self.crawl.max_cycles,
            clear_on_success: self.checkpoint.clear_on_success,
            sort_by_date: self.output.sort_by_date,
            ascending: self.output.ascending,
            capture_markup: self.output.debug_html,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: Duration::from_millis(self.retry.jitter_ms),
        }
    }

    pub fn http_options(&self) -> HttpRendererOptions {
        HttpRendererOptions {
            user_agent: self.http.user_agent.clone(),
            timeout: Duration::from_secs(self.http.timeout_secs),
            page_size: self.http.page_size,
        }
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}
