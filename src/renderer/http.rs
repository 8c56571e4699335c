//! HTTP-backed renderer for Substack-style archives.
//!
//! Substack archive pages render their first posts on the server and load
//! the rest from `/api/v1/archive?sort=new&offset=N&limit=M` as the reader
//! scrolls. This renderer reproduces that without a browser:
//!
//! 1. [`navigate`](PageRenderer::navigate) fetches the archive page HTML.
//! 2. Each [`scroll_to_bottom`](PageRenderer::scroll_to_bottom) fetches the
//!    next page of posts from the API and appends them to the document as
//!    `post-preview` blocks (anchor plus `<time>`).
//! 3. The document length stands in for the page height, so it grows exactly
//!    when new posts arrive.
//!
//! Archives that do not expose the API (404) behave like a static page: the
//! document stops growing and the crawler exhausts it.

use super::PageRenderer;
use crate::error::RenderError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Connection settings for [`HttpArchiveRenderer`].
#[derive(Debug, Clone)]
pub struct HttpRendererOptions {
    pub user_agent: String,
    pub timeout: Duration,
    /// Posts requested per simulated scroll.
    pub page_size: u32,
}

/// One post in the archive API response. Everything is optional; posts
/// without a usable URL are skipped.
#[derive(Debug, Deserialize)]
struct ArchivePost {
    canonical_url: Option<String>,
    slug: Option<String>,
    title: Option<String>,
    post_date: Option<String>,
}

/// [`PageRenderer`] that pages through an archive's JSON API with `reqwest`.
#[derive(Debug)]
pub struct HttpArchiveRenderer {
    client: Client,
    page_size: u32,
    origin: Option<Url>,
    page: String,
    appended: String,
    offset: usize,
    paging_unavailable: bool,
    closed: bool,
}

impl HttpArchiveRenderer {
    /// Build the HTTP client. Fails only if the TLS backend cannot start.
    pub fn new(options: &HttpRendererOptions) -> Result<Self, RenderError> {
        let client = Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .build()
            .map_err(|e| RenderError::Permanent(format!("HTTP client unavailable: {e}")))?;
        Ok(Self {
            client,
            page_size: options.page_size.max(1),
            origin: None,
            page: String::new(),
            appended: String::new(),
            offset: 0,
            paging_unavailable: false,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), RenderError> {
        if self.closed {
            return Err(RenderError::Permanent("renderer session is closed".into()));
        }
        Ok(())
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, RenderError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_reqwest)?;
        if let Some(err) = classify_status(response.status(), url) {
            return Err(err);
        }
        Ok(response)
    }

    fn api_url(&self, origin: &Url) -> Result<Url, RenderError> {
        let mut api = origin
            .join("/api/v1/archive")
            .map_err(|e| RenderError::Permanent(format!("cannot build archive API URL: {e}")))?;
        api.query_pairs_mut()
            .append_pair("sort", "new")
            .append_pair("offset", &self.offset.to_string())
            .append_pair("limit", &self.page_size.to_string());
        Ok(api)
    }

    /// Fold one archive API response into the document and return the
    /// number of posts appended.
    ///
    /// A 404 switches the renderer to static mode; unparseable JSON is
    /// transient because the API answers with error pages under load.
    fn apply_api_response(
        &mut self,
        origin: &Url,
        response: Result<String, RenderError>,
    ) -> Result<usize, RenderError> {
        let body = match response {
            Ok(body) => body,
            Err(RenderError::NotFound(reason)) => {
                warn!(%reason, "Archive API not available; treating page as static");
                self.paging_unavailable = true;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };
        let posts: Vec<ArchivePost> = serde_json::from_str(&body)
            .map_err(|e| RenderError::Transient(format!("archive API returned malformed JSON: {e}")))?;
        Ok(self.append_posts(origin, &posts))
    }

    fn append_posts(&mut self, origin: &Url, posts: &[ArchivePost]) -> usize {
        let mut appended = 0;
        for post in posts {
            let url = match (&post.canonical_url, &post.slug) {
                (Some(url), _) => url.clone(),
                (None, Some(slug)) => match origin.join(&format!("/p/{slug}")) {
                    Ok(url) => url.to_string(),
                    Err(_) => continue,
                },
                (None, None) => continue,
            };
            self.appended.push_str(&post_preview(
                &url,
                post.title.as_deref().unwrap_or_default(),
                post.post_date.as_deref(),
            ));
            appended += 1;
        }
        self.offset += posts.len();
        debug!(received = posts.len(), appended, "Loaded archive posts");
        appended
    }
}

impl PageRenderer for HttpArchiveRenderer {
    #[instrument(level = "info", skip(self))]
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.ensure_open()?;
        let target =
            Url::parse(url).map_err(|e| RenderError::Permanent(format!("invalid URL {url}: {e}")))?;

        let body = self
            .get(&target)
            .await?
            .text()
            .await
            .map_err(classify_reqwest)?;

        info!(bytes = body.len(), "Loaded archive page");
        self.origin = Some(target);
        self.page = body;
        self.appended.clear();
        self.offset = 0;
        self.paging_unavailable = false;
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(offset = self.offset))]
    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        self.ensure_open()?;
        if self.paging_unavailable {
            return Ok(());
        }
        let Some(origin) = self.origin.clone() else {
            return Err(RenderError::Permanent("scroll before navigate".into()));
        };
        let api = self.api_url(&origin)?;

        let response = match self.get(&api).await {
            Ok(response) => response.text().await.map_err(classify_reqwest),
            Err(e) => Err(e),
        };
        let appended = self.apply_api_response(&origin, response)?;
        debug!(appended, offset = self.offset, "Archive page applied");
        Ok(())
    }
    async fn current_height(&mut self) -> Result<u64, RenderError> {
        self.ensure_open()?;
        Ok((self.page.len() + self.appended.len()) as u64)
    }

    async fn current_markup(&mut self) -> Result<String, RenderError> {
        self.ensure_open()?;
        Ok(splice_before_body_end(&self.page, &self.appended))
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.page.clear();
            self.appended.clear();
            info!(posts_loaded = self.offset, "Renderer session closed");
        }
    }
}

fn classify_reqwest(e: reqwest::Error) -> RenderError {
    if e.is_builder() || e.is_redirect() {
        RenderError::Permanent(e.to_string())
    } else {
        RenderError::Transient(e.to_string())
    }
}

/// Map a response status to an error, or `None` for success.
///
/// Messages start with the numeric status code.
fn classify_status(status: StatusCode, url: &Url) -> Option<RenderError> {
    if status.is_success() {
        return None;
    }
    let message = format!("{} from {url}", status.as_u16());
    if status == StatusCode::NOT_FOUND {
        Some(RenderError::NotFound(message))
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Some(RenderError::Transient(message))
    } else {
        Some(RenderError::Permanent(message))
    }
}

fn post_preview(url: &str, title: &str, date: Option<&str>) -> String {
    let time = date
        .map(|d| format!("<time datetime=\"{}\">{}</time>", escape_html(d), escape_html(d)))
        .unwrap_or_default();
    format!(
        "<div class=\"post-preview\"><a href=\"{}\">{}</a>{}</div>\n",
        escape_html(url),
        escape_html(title),
        time
    )
}

fn splice_before_body_end(page: &str, appended: &str) -> String {
    match page.rfind("</body>") {
        Some(idx) => format!("{}{}{}", &page[..idx], appended, &page[idx..]),
        None => format!("{page}{appended}"),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
