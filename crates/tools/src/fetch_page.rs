//! Page fetch tool: render a page in a headless browser, fall back to a
//! plain HTTP GET.
//!
//! The browser path retries with a doubling timeout (`timeout * 2^attempt`).
//! Whatever path succeeds, the HTML is reduced to readable text before it is
//! handed back to the model.

use async_trait::async_trait;
use mnemos_config::FetchConfig;
use mnemos_core::error::ToolError;
use mnemos_core::tool::{Tool, ToolOutput};
use mnemos_core::RequestId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Characters of page text returned to the caller.
pub const MAX_TEXT_CHARS: usize = 3000;

/// Headroom over the fetch budget for text extraction and scheduling.
const DEADLINE_SLACK: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "mnemos/0.1 (+https://github.com/mnemos-agent/mnemos)";

const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser exited with {status}: {stderr}")]
    BrowserExit { status: String, stderr: String },

    #[error("http error: {0}")]
    Http(String),
}

/// Something that turns a URL into HTML.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}

/// Headless Chromium via `--dump-dom`.
pub struct ChromiumRenderer {
    binary: PathBuf,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Use `configured` when given, else the first known browser on `PATH`.
    pub fn discover(configured: Option<&str>) -> Option<Self> {
        if let Some(path) = configured {
            return which::which(path).ok().map(Self::new);
        }
        BROWSER_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let timeout_flag = format!("--timeout={}", timeout.as_millis());
        let child = Command::new(&self.binary)
            .args([
                "--headless",
                "--disable-gpu",
                "--no-sandbox",
                "--dump-dom",
                timeout_flag.as_str(),
                url,
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| FetchError::Timeout {
                secs: timeout.as_secs(),
            })?
            .map_err(|e| FetchError::Launch(e.to_string()))?;

        if !output.status.success() {
            return Err(FetchError::BrowserExit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).chars().take(300).collect(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Static GET through `reqwest`.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        secs: timeout.as_secs(),
                    }
                } else {
                    FetchError::Http(e.to_string())
                }
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "Non-success status on fallback fetch");
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Browser,
    Http,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub source: FetchSource,
    pub text: String,
    pub error: Option<String>,
    pub attempts: u32,
}

// Literal patterns; compiled once.
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex")
});

fn decode_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }
    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

/// Strip scripts, styles and tags, decode entities, collapse whitespace.
pub fn html_to_text(html: &str, max_chars: usize) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = ENTITY_RE.replace_all(&text, |caps: &regex::Captures| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

/// `FetchRenderedPage`: browser first, HTTP fallback.
pub struct FetchRenderedPageTool {
    browser: Option<Arc<dyn PageRenderer>>,
    http: Arc<dyn PageRenderer>,
    timeout: Duration,
    max_retries: u32,
}

impl FetchRenderedPageTool {
    pub fn new(
        browser: Option<Arc<dyn PageRenderer>>,
        http: Arc<dyn PageRenderer>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            browser,
            http,
            timeout,
            max_retries,
        }
    }

    /// Wire up a local Chromium (if any) and `reqwest` from config.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        let browser = ChromiumRenderer::discover(config.browser.as_deref())
            .map(|b| Arc::new(b) as Arc<dyn PageRenderer>);
        if browser.is_none() {
            info!("No headless browser found; page fetches use plain HTTP");
        }
        Ok(Self::new(
            browser,
            Arc::new(HttpRenderer::new()?),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        ))
    }

    fn fallback_timeout(&self) -> Duration {
        (self.timeout * 2).max(Duration::from_secs(10))
    }

    /// Worst case for one fetch: every browser attempt times out, then the
    /// HTTP fallback does too.
    pub fn budget(&self) -> Duration {
        let browser = match self.browser {
            Some(_) => (0..=self.max_retries)
                .map(|attempt| self.timeout * 2u32.saturating_pow(attempt))
                .sum(),
            None => Duration::ZERO,
        };
        browser + self.fallback_timeout()
    }

    pub async fn fetch(&self, url: &str, request_id: &RequestId) -> FetchResult {
        let mut attempts = 0u32;
        let mut last_err = String::from("browser unavailable");

        if let Some(browser) = &self.browser {
            for attempt in 0..=self.max_retries {
                attempts += 1;
                let timeout = self.timeout * 2u32.saturating_pow(attempt);
                match browser.render(url, timeout).await {
                    Ok(html) => {
                        info!(request_id = %request_id, url, attempts, "fetch.browser.ok");
                        return FetchResult {
                            source: FetchSource::Browser,
                            text: html_to_text(&html, MAX_TEXT_CHARS),
                            error: None,
                            attempts,
                        };
                    }
                    Err(e) => {
                        warn!(request_id = %request_id, url, attempt = attempt + 1, error = %e, "fetch.browser.fail");
                        last_err = format!("browser error (attempt {}): {e}", attempt + 1);
                    }
                }
            }
        }

        attempts += 1;
        match self.http.render(url, self.fallback_timeout()).await {
            Ok(html) => {
                info!(request_id = %request_id, url, attempts, "fetch.http.ok");
                FetchResult {
                    source: FetchSource::Http,
                    text: html_to_text(&html, MAX_TEXT_CHARS),
                    error: Some(format!("browser_failed: {last_err}")),
                    attempts,
                }
            }
            Err(e) => FetchResult {
                source: FetchSource::Error,
                text: String::new(),
                error: Some(format!("browser_failed: {last_err}; http_failed: {e}")),
                attempts,
            },
        }
    }
}

#[async_trait]
impl Tool for FetchRenderedPageTool {
    fn name(&self) -> &str {
        "FetchRenderedPage"
    }

    fn description(&self) -> &str {
        "Fetch a web page (headless browser with plain HTTP fallback) and return its text. \
         Argument: the URL."
    }

    async fn invoke(&self, arg: &str, request_id: &RequestId) -> Result<ToolOutput, ToolError> {
        let url = arg.trim();
        let result = if url.is_empty() {
            FetchResult {
                source: FetchSource::Error,
                text: String::new(),
                error: Some("no_url_provided".into()),
                attempts: 0,
            }
        } else if !(url.starts_with("http://") || url.starts_with("https://")) {
            FetchResult {
                source: FetchSource::Error,
                text: String::new(),
                error: Some(format!("unsupported url: {url}")),
                attempts: 0,
            }
        } else {
            self.fetch(url, request_id).await
        };
        ToolOutput::structured(&result)
    }

    fn min_deadline(&self) -> Option<Duration> {
        Some(self.budget() + DEADLINE_SLACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails the first `failures` calls, then returns `html`. Records timeouts.
    struct ScriptedRenderer {
        failures: usize,
        html: &'static str,
        seen: Mutex<Vec<Duration>>,
    }

    impl ScriptedRenderer {
        fn new(failures: usize, html: &'static str) -> Arc<Self> {
            Arc::new(Self {
                failures,
                html,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PageRenderer for ScriptedRenderer {
        async fn render(&self, _url: &str, timeout: Duration) -> Result<String, FetchError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(timeout);
            if seen.len() <= self.failures {
                Err(FetchError::Timeout {
                    secs: timeout.as_secs(),
                })
            } else {
                Ok(self.html.to_string())
            }
        }
    }

    #[test]
    fn html_is_reduced_to_text() {
        let html = r#"<html><head><style>body{color:red}</style><script>var x = "<b>";</script></head>
            <body><h1>Hello &amp; welcome</h1><p>Price:&nbsp;&#36;5 &lt;today&gt;</p></body></html>"#;
        assert_eq!(html_to_text(html, 3000), "Hello & welcome Price: $5 <today>");
        assert_eq!(html_to_text("<p>abcdef</p>", 3), "abc");
    }

    #[tokio::test]
    async fn browser_retries_with_doubling_timeout() {
        let browser = ScriptedRenderer::new(2, "<p>rendered</p>");
        let http = ScriptedRenderer::new(0, "<p>static</p>");
        let tool = FetchRenderedPageTool::new(Some(browser.clone()), http.clone(), Duration::from_secs(15), 2);

        let result = tool.fetch("https://example.com", &RequestId::new()).await;
        assert_eq!(result.source, FetchSource::Browser);
        assert_eq!(result.text, "rendered");
        assert_eq!(result.attempts, 3);
        assert_eq!(
            *browser.seen.lock().unwrap(),
            vec![Duration::from_secs(15), Duration::from_secs(30), Duration::from_secs(60)]
        );
        assert!(http.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_http_after_retries() {
        let browser = ScriptedRenderer::new(10, "");
        let http = ScriptedRenderer::new(0, "<p>static</p>");
        let tool = FetchRenderedPageTool::new(Some(browser), http, Duration::from_secs(1), 1);

        let result = tool.fetch("https://example.com", &RequestId::new()).await;
        assert_eq!(result.source, FetchSource::Http);
        assert_eq!(result.text, "static");
        assert_eq!(result.attempts, 3);
        assert!(result.error.unwrap().contains("attempt 2"));
    }

    #[tokio::test]
    async fn both_paths_failing_reports_error() {
        let tool = FetchRenderedPageTool::new(
            None,
            ScriptedRenderer::new(10, ""),
            Duration::from_secs(1),
            2,
        );
        let result = tool.fetch("https://example.com", &RequestId::new()).await;
        assert_eq!(result.source, FetchSource::Error);
        assert_eq!(result.attempts, 1);
        assert!(result.error.unwrap().contains("http_failed"));
    }

    #[test]
    fn budget_covers_every_attempt_and_the_fallback() {
        let http = ScriptedRenderer::new(0, "");
        let with_browser = FetchRenderedPageTool::new(
            Some(ScriptedRenderer::new(0, "")),
            http.clone(),
            Duration::from_secs(15),
            2,
        );
        assert_eq!(with_browser.budget(), Duration::from_secs(15 + 30 + 60 + 30));
        assert_eq!(with_browser.min_deadline(), Some(Duration::from_secs(140)));

        let http_only = FetchRenderedPageTool::new(None, http, Duration::from_secs(2), 2);
        assert_eq!(http_only.budget(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_url_is_reported_not_raised() {
        let tool = FetchRenderedPageTool::new(None, ScriptedRenderer::new(0, ""), Duration::from_secs(1), 0);
        let out = tool.invoke("   ", &RequestId::new()).await.unwrap();
        assert_eq!(out.as_json().unwrap()["source"], "error");
        assert_eq!(out.as_json().unwrap()["error"], "no_url_provided");
    }
}
