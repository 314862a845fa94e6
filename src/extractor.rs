//! Corresponding-author extraction from the Web of Science web interface.
//!
//! A session is a cookie-carrying HTTP client with its own user agent. For
//! each paper the session runs a title-field search, opens the first hit and
//! reads the reprint-address labels, which is where the database lists
//! corresponding authors.
//!
//! When a CAPTCHA page comes back the session waits `captcha_wait` so it can
//! be solved in a browser sharing the same cookies, then fetches the page
//! once more. A second CAPTCHA fails the request.

use crate::cookies::CookieManager;
use crate::error::{OptionExt, Result, WosError};
use rand::seq::SliceRandom;
use rand::Rng;
use scraper::{Html, Selector};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Web of Science URL
pub const DEFAULT_WOS_URL: &str = "https://webofscience.clarivate.cn";

/// Advanced search page, also used to warm up a new session
const SEARCH_PATH: &str = "/wos/woscc/advanced-search";

/// Label suffix separating corresponding-author entries
const CORRESPONDING_TAG: &str = "(corresponding author)";

/// Fragments that mark an address line rather than a person
const INSTITUTION_KEYWORDS: &[&str] = &["univ", "school", "institute", "dept"];

/// Pool of browser user agents; each session picks one
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Random pause taken before each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolitenessDelay {
    pub min: Duration,
    pub max: Duration,
}

impl PolitenessDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    /// No pause at all
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Pick a duration in `[min, max]`
    pub fn sample(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    pub async fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Pausing");
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for PolitenessDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(5))
    }
}

/// Options for opening extractor sessions
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Custom base URL for mirror sites
    pub base_url: Option<String>,
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Pause before each request
    pub delay: PolitenessDelay,
    /// Cookie file; defaults to `~/.wos_cookies.json`
    pub cookie_file: Option<PathBuf>,
    /// Wait after a CAPTCHA page before fetching again; zero fails at once
    pub captcha_wait: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            proxy: None,
            timeout: Duration::from_secs(30),
            delay: PolitenessDelay::default(),
            cookie_file: None,
            captcha_wait: Duration::from_secs(30),
        }
    }
}

/// Looks up corresponding authors for one paper title.
#[allow(async_fn_in_trait)]
pub trait CorrespondingAuthorLookup {
    /// Return the deduplicated corresponding-author names, or an error if
    /// nothing usable was found.
    async fn lookup(&mut self, title: &str) -> Result<Vec<String>>;
}

/// Opens fresh lookup sessions. The batch driver opens one per pass.
#[allow(async_fn_in_trait)]
pub trait SessionFactory {
    type Session: CorrespondingAuthorLookup;

    async fn open(&self) -> Result<Self::Session>;
}

/// Opens [`WosSession`]s from [`SessionOptions`].
pub struct WosSessionFactory {
    options: SessionOptions,
}

impl WosSessionFactory {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }
}

impl SessionFactory for WosSessionFactory {
    type Session = WosSession;

    async fn open(&self) -> Result<WosSession> {
        WosSession::open(&self.options).await
    }
}

/// A live HTTP session against the citation database.
pub struct WosSession {
    client: reqwest::Client,
    base_url: Url,
    cookie_header: String,
    delay: PolitenessDelay,
    captcha_wait: Duration,
}

impl WosSession {
    /// Build a client and load the search page once.
    pub async fn open(options: &SessionOptions) -> Result<Self> {
        let base = options
            .base_url
            .as_deref()
            .map(|s| s.trim_end_matches('/'))
            .unwrap_or(DEFAULT_WOS_URL);
        let base_url = Url::parse(base)
            .map_err(|e| WosError::Config(format!("Invalid base URL '{}': {}", base, e)))?;
        let host = base_url
            .host_str()
            .ok_or_else(|| WosError::Config(format!("Base URL has no host: {}", base)))?
            .to_string();

        let cookie_manager = CookieManager::from_path_or_default(options.cookie_file.clone());
        let cookie_header = cookie_manager.header_for_host(&host);
        if cookie_header.is_empty() {
            warn!("No cookies loaded. Run 'rustwos cookies import' to reuse a browser session.");
        }

        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        info!(url = %base_url, user_agent = user_agent, "Opening session");

        let client = build_http_client(user_agent, options.proxy.as_deref(), options.timeout)?;
        let session = Self {
            client,
            base_url,
            cookie_header,
            delay: options.delay,
            captcha_wait: options.captcha_wait,
        };

        let landing = session.url_for(SEARCH_PATH)?;
        session.get(&landing).await.map_err(|e| match e {
            WosError::Captcha => WosError::Captcha,
            other => WosError::Session(format!("Failed to load search page: {}", other)),
        })?;

        Ok(session)
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| WosError::Config(format!("Invalid URL path '{}': {}", path, e)))
    }

    async fn get(&self, url: &Url) -> Result<String> {
        self.delay.pause().await;
        fetch_through_captcha(self.captcha_wait, || {
            fetch_page_with_cookies(&self.client, url, &self.cookie_header)
        })
        .await
    }
}

impl CorrespondingAuthorLookup for WosSession {
    async fn lookup(&mut self, title: &str) -> Result<Vec<String>> {
        let search_url = build_search_url(&self.base_url, title)?;
        debug!(url = %search_url, "Searching title");
        let results_html = self.get(&search_url).await?;

        let href = parse_first_record_link(&results_html)?
            .ok_or_else(|| WosError::NotFound("no search results".to_string()))?;
        let record_url = self.url_for(&href)?;
        debug!(url = %record_url, "Opening first result");
        let record_html = self.get(&record_url).await?;

        let labels = parse_corresponding_labels(&record_html)?;
        debug!(count = labels.len(), raw = %labels.join("; "), "Read author labels");

        let names = clean_corresponding_labels(&labels);
        if names.is_empty() {
            return Err(WosError::NotFound(
                "no corresponding author on record page".to_string(),
            ));
        }
        info!(authors = %names.join("; "), "Found corresponding authors");
        Ok(names)
    }
}

/// Build HTTP client with optional proxy
fn build_http_client(
    user_agent: &str,
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
            WosError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e))
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| WosError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Build a title-field (`TI=`) advanced search URL
pub fn build_search_url(base_url: &Url, title: &str) -> Result<Url> {
    let mut url = base_url
        .join(SEARCH_PATH)
        .map_err(|e| WosError::Config(format!("Invalid base URL: {}", e)))?;
    url.query_pairs_mut()
        .append_pair("query", &format!("TI={}", title));
    Ok(url)
}

/// Fetch page content, sending stored cookies if any
async fn fetch_page_with_cookies(
    client: &reqwest::Client,
    url: &Url,
    cookie_header: &str,
) -> Result<String> {
    let mut request = client
        .get(url.as_str())
        .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
        .header("Accept-Language", "en-US,en;q=0.9")
        .header("Cache-Control", "no-cache")
        .header("Upgrade-Insecure-Requests", "1");

    if !cookie_header.is_empty() {
        request = request.header("Cookie", cookie_header);
    }

    let response = request.send().await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(WosError::RateLimited(60));
    }

    if !status.is_success() {
        return Err(WosError::Api {
            code: status.as_u16() as i32,
            message: format!("HTTP error: {}", status),
        });
    }

    Ok(response.text().await?)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| WosError::Parse(e.to_string()))
}

fn is_captcha_page(html: &str) -> bool {
    let document = Html::parse_document(html);
    selector("#captcha-container")
        .map(|s| document.select(&s).next().is_some())
        .unwrap_or(false)
}

/// Run `fetch`; on a CAPTCHA page wait `wait` and run it once more.
async fn fetch_through_captcha<F, Fut>(wait: Duration, mut fetch: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let html = fetch().await?;
    if !is_captcha_page(&html) {
        return Ok(html);
    }
    if wait.is_zero() {
        warn!("CAPTCHA detected");
        return Err(WosError::Captcha);
    }

    warn!(
        wait_secs = wait.as_secs(),
        "CAPTCHA detected, solve it in the browser; retrying after the wait"
    );
    tokio::time::sleep(wait).await;
    let html = fetch().await?;
    if is_captcha_page(&html) {
        warn!("CAPTCHA still present");
        return Err(WosError::Captcha);
    }
    Ok(html)
}

/// Link of the first record on a search results page, if any.
pub fn parse_first_record_link(html: &str) -> Result<Option<String>> {
    let document = Html::parse_document(html);
    let link_selector = selector(r#"a[data-ta="summary-record-title-link"]"#)?;

    let Some(link) = document.select(&link_selector).next() else {
        return Ok(None);
    };
    let href = link
        .value()
        .attr("href")
        .ok_or_parse("first result link has no href")?;
    Ok(Some(href.to_string()))
}

/// Raw author labels from the reprint-address blocks of a record page.
pub fn parse_corresponding_labels(html: &str) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let section_selector = selector(".author-info-section")?;
    let title_selector = selector(r#"[id^="FRAiinTa-RepAddrTitle-"]"#)?;
    let label_selector = selector("span.value.section-label-data")?;

    let mut labels = Vec::new();
    for section in document.select(&section_selector) {
        if section.select(&title_selector).next().is_none() {
            continue;
        }
        for label in section.select(&label_selector) {
            let text = label
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !text.is_empty() {
                labels.push(text);
            }
        }
    }
    Ok(labels)
}

/// Reduce raw labels to unique `"Surname, Given"` names.
///
/// Labels are split on the corresponding-author tag and on `;`. Segments
/// that are not exactly two non-empty comma parts, or that mention an
/// institution, are dropped. First occurrence wins.
pub fn clean_corresponding_labels<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let joined = labels
        .iter()
        .map(|l| l.as_ref())
        .collect::<Vec<_>>()
        .join("; ");

    let mut names: Vec<String> = Vec::new();
    for segment in joined.split(CORRESPONDING_TAG) {
        for candidate in segment.split(';').map(str::trim) {
            if !looks_like_person(candidate) {
                continue;
            }
            if !names.iter().any(|n| n == candidate) {
                names.push(candidate.to_string());
            }
        }
    }
    names
}

fn looks_like_person(candidate: &str) -> bool {
    let parts: Vec<&str> = candidate.split(',').map(str::trim).collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return false;
    }
    let lower = candidate.to_lowercase();
    !INSTITUTION_KEYWORDS.iter().any(|k| lower.contains(k))
}
