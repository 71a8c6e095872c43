//! Website metadata extraction
//!
//! Fetches an HTML page and pulls out its title, description, icons and
//! Open Graph properties. [`MetadataClient`] is the [`Producer`] behind
//! [`MetadataCache`], which memoizes results per URL on disk.

use std::sync::OnceLock;

use regex_lite::Regex;
use reqwest::Client;
use serde_json::{Map, Value};

use super::remote::{fetch_remote_contents, RemoteError};
use crate::cache::{CacheStore, Params, ProduceError, Producer};
use crate::config::{CacheConfig, FetchConfig};

/// `<link rel>` values whose `href` is collected
const ICON_RELS: [&str; 2] = ["apple-touch-icon", "icon"];

/// Prefix of Open Graph property names
const OPEN_GRAPH_PREFIX: &str = "og:";

impl From<RemoteError> for ProduceError {
    fn from(err: RemoteError) -> Self {
        ProduceError::Unavailable(err.to_string())
    }
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid title regex"))
}

fn meta_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<meta\b([^>]*)>").expect("valid meta regex"))
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<link\b([^>]*)>").expect("valid link regex"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)([a-z_:][a-z0-9_:.\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("valid attribute regex")
    })
}

/// Attributes of one tag, names lower-cased, values entity-decoded
struct Attributes(Vec<(String, String)>);

impl Attributes {
    fn parse(source: &str) -> Self {
        let pairs = attribute_regex()
            .captures_iter(source)
            .map(|caps| {
                let name = caps[1].to_ascii_lowercase();
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map_or("", |m| m.as_str());
                (name, decode_entities(value))
            })
            .collect();
        Self(pairs)
    }

    /// Value of `name`, empty if absent
    fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map_or("", |(_, v)| v.as_str())
    }
}

/// Extracts metadata from an HTML document.
///
/// Collects `title`, `description`, `icon`, `apple-touch-icon` and every
/// `og:*` property. Keys are lower-cased; later tags override earlier ones.
pub fn extract_metadata(html: &str) -> Map<String, Value> {
    let mut ret = Map::new();

    if let Some(caps) = title_regex().captures(html) {
        let title = decode_entities(caps[1].trim());
        ret.insert("title".to_string(), Value::String(title));
    }

    let metas: Vec<Attributes> = meta_regex()
        .captures_iter(html)
        .map(|caps| Attributes::parse(&caps[1]))
        .collect();

    for meta in &metas {
        if meta.get("name").eq_ignore_ascii_case("description") {
            ret.insert(
                "description".to_string(),
                Value::String(meta.get("content").to_string()),
            );
        }
    }

    for caps in link_regex().captures_iter(html) {
        let link = Attributes::parse(&caps[1]);
        let rel = link.get("rel").to_ascii_lowercase();
        if ICON_RELS.contains(&rel.as_str()) {
            ret.insert(rel, Value::String(link.get("href").to_string()));
        }
    }

    for meta in &metas {
        let name = match meta.get("name") {
            "" => meta.get("property"),
            name => name,
        };
        let key = name.to_ascii_lowercase();
        if key.starts_with(OPEN_GRAPH_PREFIX) {
            ret.insert(key, Value::String(meta.get("content").to_string()));
        }
    }

    ret
}

/// Decodes the handful of HTML entities that commonly show up in metadata
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

/// Client for fetching metadata of a web page
#[derive(Debug, Clone)]
pub struct MetadataClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Fetch settings
    config: FetchConfig,
}

impl MetadataClient {
    /// Creates a new MetadataClient with the given fetch settings
    pub fn new(config: FetchConfig) -> Self {
        Self {
            http_client: Client::new(),
            config,
        }
    }

    /// Fetches `url` and extracts its metadata
    pub async fn fetch_metadata(&self, url: &str) -> Result<Map<String, Value>, RemoteError> {
        let html = fetch_remote_contents(&self.http_client, url, self.config.timeout).await?;
        Ok(extract_metadata(&html))
    }
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl Producer for MetadataClient {
    async fn produce(&self, params: &Params) -> Result<Value, ProduceError> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ProduceError::InvalidParams("expected a \"url\" string".to_string()))?;
        let metadata = self.fetch_metadata(url).await?;
        Ok(Value::Object(metadata))
    }
}

/// Disk-memoized metadata lookups keyed by URL
#[derive(Debug)]
pub struct MetadataCache {
    store: CacheStore<MetadataClient>,
}

impl MetadataCache {
    /// Creates a cache in the configured directory
    pub fn new(cache: &CacheConfig, fetch: FetchConfig) -> Self {
        Self {
            store: CacheStore::new(cache, MetadataClient::new(fetch)),
        }
    }

    /// Returns metadata for `url` from the cache, fetching it on a miss.
    ///
    /// `None` means the page could not be fetched; see
    /// [`last_error`](Self::last_error).
    pub async fn get(&mut self, url: &str) -> Option<Value> {
        let mut params = Params::new();
        params.insert("url".to_string(), Value::String(url.to_string()));
        self.store.get_data(&params).await
    }

    /// Message describing the last failed fetch
    pub fn last_error(&self) -> Option<&str> {
        self.store.last_error()
    }

    /// Removes expired entries, returning how many were deleted
    pub fn clean(&self) -> usize {
        self.store.clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title> Example &amp; Co </title>
  <meta name="Description" content="An example page">
  <meta property="og:title" content="OG Example">
  <meta name="og:Image" content='https://example.com/og.png'>
  <link rel="icon" href="/favicon.ico">
  <link REL="apple-touch-icon" href="/touch.png">
  <link rel="stylesheet" href="/style.css">
</head>
<body><title>Not this one</title></body>
</html>"#;

    #[test]
    fn test_extract_full_page() {
        let metadata = extract_metadata(PAGE);

        assert_eq!(
            Value::Object(metadata),
            json!({
                "title": "Example & Co",
                "description": "An example page",
                "og:title": "OG Example",
                "og:image": "https://example.com/og.png",
                "icon": "/favicon.ico",
                "apple-touch-icon": "/touch.png",
            })
        );
    }

    #[test]
    fn test_extract_empty_document() {
        assert!(extract_metadata("").is_empty());
        assert!(extract_metadata("<html><body>plain</body></html>").is_empty());
    }

    #[test]
    fn test_meta_without_content_yields_empty_string() {
        let metadata = extract_metadata(r#"<meta name="description">"#);
        assert_eq!(metadata["description"], json!(""));
    }

    #[test]
    fn test_later_tags_override_earlier() {
        let html = r#"<link rel="icon" href="a.ico"><link rel="icon" href="b.ico">"#;
        assert_eq!(extract_metadata(html)["icon"], json!("b.ico"));
    }

    #[test]
    fn test_shortcut_icon_is_ignored() {
        let html = r#"<link rel="shortcut icon" href="a.ico">"#;
        assert!(extract_metadata(html).is_empty());
    }

    #[test]
    fn test_unquoted_attributes() {
        let html = "<meta property=og:type content=website>";
        assert_eq!(extract_metadata(html)["og:type"], json!("website"));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &quot;c&quot;"), "a <b> \"c\"");
        assert_eq!(decode_entities("&#39;&#x41;&#X42;"), "'AB");
        assert_eq!(decode_entities("Tom & Jerry"), "Tom & Jerry");
        assert_eq!(decode_entities("&unknown; &"), "&unknown; &");
    }

    #[tokio::test]
    async fn test_produce_requires_url_param() {
        let client = MetadataClient::default();
        let params = Params::new();

        let result = client.produce(&params).await;

        assert!(matches!(result, Err(ProduceError::InvalidParams(_))));
    }

    #[test]
    fn test_remote_error_maps_to_unavailable() {
        let err: ProduceError = RemoteError::StatusError(reqwest::StatusCode::BAD_GATEWAY).into();
        assert_eq!(
            err,
            ProduceError::Unavailable("Unexpected HTTP status: 502 Bad Gateway".to_string())
        );
    }
}
