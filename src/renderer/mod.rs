//! Page renderer capability and its implementations.
//!
//! The crawler never talks to a browser or HTTP client directly. It drives a
//! [`PageRenderer`], an exclusively owned session that can load a page, scroll
//! it, and report its height and markup.
//!
//! # Implementations
//!
//! | Type | Module | Notes |
//! |------|--------|-------|
//! | [`HttpArchiveRenderer`] | [`http`] | Pages through `/api/v1/archive` with `reqwest` |
//! | [`RetryRenderer`] | [`retry`] | Decorator adding the retry policy to any renderer |

use crate::error::RenderError;

pub mod http;
pub mod retry;

pub use http::HttpArchiveRenderer;
pub use retry::{RetryPolicy, RetryRenderer};

/// A scroll-capable page session.
///
/// Implementors classify their failures as [`RenderError::Transient`] or
/// [`RenderError::Permanent`]; the retry decorator relies on it.
pub trait PageRenderer {
    /// Load `url`, replacing the current document.
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    /// Scroll to the bottom of the current document, triggering lazy loads.
    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError>;

    /// Current document height.
    async fn current_height(&mut self) -> Result<u64, RenderError>;

    /// Current rendered markup.
    async fn current_markup(&mut self) -> Result<String, RenderError>;

    /// Release the session. Called exactly once, on every exit path.
    async fn close(&mut self);
}
