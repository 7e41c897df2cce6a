//! Web tools — search (Brave API) and fetch (HTTP content extraction).
//!
//! Network access is deliberately outside the sandbox; both tools carry
//! their own HTTP timeouts instead.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::base::{optional_i64, require_string, Tool};

const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Max chars for fetched content.
const DEFAULT_MAX_CHARS: usize = 50_000;

/// Max search results.
const DEFAULT_MAX_RESULTS: usize = 5;

// ─────────────────────────────────────────────
// web_search
// ─────────────────────────────────────────────

/// Searches the web using the Brave Search API.
pub struct WebSearchTool {
    api_key: Option<String>,
    client: Client,
}

impl WebSearchTool {
    /// `api_key` can be `None`; it falls back to the `BRAVE_API_KEY` env
    /// var at call time.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("BRAVE_API_KEY").ok())
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns a numbered list of results with titles, URLs, and descriptions."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "count": {
                    "type": "integer",
                    "description": "Number of results (1-10, default 5)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let query = require_string(&params, "query")?;
        let count = optional_i64(&params, "count").unwrap_or(DEFAULT_MAX_RESULTS as i64) as usize;
        let count = count.clamp(1, 10);

        let api_key = self.resolve_api_key().ok_or_else(|| {
            anyhow::anyhow!("no search API key configured (set BRAVE_API_KEY)")
        })?;

        debug!(query = %query, count = count, "searching web");

        let resp = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", &api_key)
            .query(&[("q", &query), ("count", &count.to_string())])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("search request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("search API returned {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse search response: {e}"))?;

        let results = body["web"]["results"].as_array().cloned().unwrap_or_default();
        if results.is_empty() {
            return Ok("No results found.".into());
        }

        let mut output = Vec::new();
        for (i, r) in results.iter().enumerate() {
            let title = r["title"].as_str().unwrap_or("(no title)");
            let url = r["url"].as_str().unwrap_or("");
            let desc = r["description"].as_str().unwrap_or("");
            output.push(format!("{}. {}\n   {}\n   {}", i + 1, title, url, desc));
        }

        Ok(output.join("\n\n"))
    }
}

// ─────────────────────────────────────────────
// web_fetch
// ─────────────────────────────────────────────

/// Fetches and extracts text content from a web page.
pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .redirect(reqwest::redirect::Policy::limited(5))
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL and extract the main text content. \
         HTML is converted to text; JSON is pretty-printed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The URL to fetch"
                },
                "max_chars": {
                    "type": "integer",
                    "description": "Maximum characters to return (default 50000)",
                    "minimum": 100
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: HashMap<String, Value>) -> anyhow::Result<String> {
        let url = require_string(&params, "url")?;
        let max_chars =
            optional_i64(&params, "max_chars").unwrap_or(DEFAULT_MAX_CHARS as i64) as usize;
        let max_chars = max_chars.max(100);

        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("invalid URL: must start with http:// or https://");
        }

        debug!(url = %url, "fetching web page");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("HTTP request failed: {e}"))?;

        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read body: {e}"))?;

        let text = if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(v) => serde_json::to_string_pretty(&v).unwrap_or(body),
                Err(_) => body,
            }
        } else if content_type.contains("text/html") || body.trim_start().starts_with('<') {
            html_to_text(&body)
        } else {
            body
        };

        let mut out = format!("[{status}] {url}\n\n{}", text.trim());
        if out.chars().count() > max_chars {
            out = out.chars().take(max_chars).collect();
            out.push_str("\n... (truncated)");
        }
        Ok(out)
    }
}

/// Crude HTML → text conversion: drops script/style blocks and tags,
/// decodes the common entities, and collapses blank runs.
fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let mut rest = html;

    // Strip script and style blocks wholesale.
    let mut cleaned = String::with_capacity(html.len());
    loop {
        // ASCII lowering keeps byte offsets aligned with `rest`.
        let lower = rest.to_ascii_lowercase();
        let open = match (lower.find("<script"), lower.find("<style")) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        match open {
            Some(start) => {
                cleaned.push_str(&rest[..start]);
                let tag_end = if lower[start..].starts_with("<script") {
                    lower[start..].find("</script>").map(|i| start + i + 9)
                } else {
                    lower[start..].find("</style>").map(|i| start + i + 8)
                };
                match tag_end {
                    Some(end) if end <= rest.len() => rest = &rest[end..],
                    _ => {
                        rest = "";
                    }
                }
            }
            None => {
                cleaned.push_str(rest);
                break;
            }
        }
    }

    // Drop remaining tags.
    let mut in_tag = false;
    for c in cleaned.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");

    // Collapse whitespace runs per line, and blank-line runs overall.
    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if lines.last().map(|l: &String| l.is_empty()).unwrap_or(true) {
                continue;
            }
            lines.push(String::new());
        } else {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_tags_and_scripts() {
        let html = r#"<html><head><script>var x = "<p>";</script><style>p{}</style></head>
<body><h1>Title</h1><p>Hello <b>world</b> &amp; friends</p></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello world & friends"));
        assert!(!text.contains("var x"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_html_to_text_collapses_blank_lines() {
        let html = "<p>a</p>\n\n\n\n<p>b</p>";
        let text = html_to_text(html);
        assert!(!text.contains("\n\n\n"));
    }

    #[tokio::test]
    async fn test_search_without_key_errors() {
        // Only run when the environment doesn't provide a key.
        if std::env::var("BRAVE_API_KEY").is_ok() {
            return;
        }
        let tool = WebSearchTool::new(None);
        let mut params = HashMap::new();
        params.insert("query".into(), json!("rust"));
        let err = tool.execute(params).await.unwrap_err();
        assert!(err.to_string().contains("BRAVE_API_KEY"));
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_http() {
        let tool = WebFetchTool::new();
        let mut params = HashMap::new();
        params.insert("url".into(), json!("file:///etc/passwd"));
        let err = tool.execute(params).await.unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn test_definitions() {
        assert_eq!(WebSearchTool::new(None).name(), "web_search");
        assert_eq!(WebFetchTool::new().name(), "web_fetch");
    }
}
