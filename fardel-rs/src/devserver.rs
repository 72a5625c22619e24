//! Dev-server proxy rules.
//!
//! The development HTTP server itself is an external collaborator; this
//! module only models its configuration contract: which path prefixes get
//! forwarded where, and how a matched path is rewritten. A rule always
//! strips its declared prefix before forwarding, so `/web/items` proxied
//! by the `/web` rule reaches the upstream as `/items`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

/// Forwards requests matching a path prefix to an upstream origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRule {
    prefix: String,
    target: String,
}

impl ProxyRule {
    pub fn new(prefix: &str, target: &str) -> Result<Self, Error> {
        if !prefix.starts_with('/') || prefix.len() < 2 {
            bail!("proxy prefix '{}' must be a non-root path starting with '/'", prefix);
        }
        if prefix.ends_with('/') {
            bail!("proxy prefix '{}' must not end with '/'", prefix);
        }
        if !target.starts_with("http://") && !target.starts_with("https://") {
            bail!("proxy target '{}' must be an http(s) origin", target);
        }
        Ok(Self {
            prefix: prefix.to_string(),
            target: target.trim_end_matches('/').to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// True when the prefix matches at a path-segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }

    /// The forwarded path with the declared prefix stripped.
    pub fn rewrite(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
            return None;
        }
        if rest.is_empty() || rest.starts_with('?') {
            Some(format!("/{}", rest))
        } else {
            Some(rest.to_string())
        }
    }

    /// Full upstream URL for a matched path.
    pub fn forward_url(&self, path: &str) -> Option<String> {
        Some(format!("{}{}", self.target, self.rewrite(path)?))
    }
}

/// Configuration handed to the external development server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevServerConfig {
    pub origin: String,
    pub overlay: bool,
    pub content_base: PathBuf,
    pub headers: BTreeMap<String, String>,
    pub proxy: Vec<ProxyRule>,
}

impl DevServerConfig {
    /// The matching rule and forward URL for a request path, longest
    /// prefix first.
    pub fn route(&self, path: &str) -> Option<(&ProxyRule, String)> {
        self.proxy
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.len())
            .and_then(|rule| rule.forward_url(path).map(|url| (rule, url)))
    }
}

/// Permissive CORS defaults for local development.
pub fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "Access-Control-Allow-Origin".to_string(),
            "*".to_string(),
        ),
        (
            "Access-Control-Allow-Methods".to_string(),
            "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
        ),
        (
            "Access-Control-Allow-Headers".to_string(),
            "X-Requested-With, content-type".to_string(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> ProxyRule {
        ProxyRule::new("/web", "http://localhost:8000").unwrap()
    }

    #[test]
    fn test_rewrite_strips_declared_prefix() {
        assert_eq!(rule().rewrite("/web/items").unwrap(), "/items");
        assert_eq!(
            rule().forward_url("/web/items").unwrap(),
            "http://localhost:8000/items"
        );
    }

    #[test]
    fn test_bare_prefix_rewrites_to_root() {
        assert_eq!(rule().rewrite("/web").unwrap(), "/");
    }

    #[test]
    fn test_segment_boundary_respected() {
        assert!(!rule().matches("/webinar/list"));
        assert!(rule().rewrite("/webinar/list").is_none());
    }

    #[test]
    fn test_query_string_preserved() {
        assert_eq!(
            rule().forward_url("/web/items?page=2").unwrap(),
            "http://localhost:8000/items?page=2"
        );
    }

    #[test]
    fn test_longest_prefix_wins() {
        let server = DevServerConfig {
            origin: "http://localhost:8080".to_string(),
            overlay: true,
            content_base: PathBuf::from("public"),
            headers: default_headers(),
            proxy: vec![
                ProxyRule::new("/api", "http://localhost:8000").unwrap(),
                ProxyRule::new("/api/v2", "http://localhost:9000").unwrap(),
            ],
        };
        let (rule, url) = server.route("/api/v2/items").unwrap();
        assert_eq!(rule.prefix(), "/api/v2");
        assert_eq!(url, "http://localhost:9000/items");
        let (rule, _) = server.route("/api/v1/items").unwrap();
        assert_eq!(rule.prefix(), "/api");
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(ProxyRule::new("web", "http://localhost:8000").is_err());
        assert!(ProxyRule::new("/web/", "http://localhost:8000").is_err());
        assert!(ProxyRule::new("/web", "localhost:8000").is_err());
        assert!(ProxyRule::new("/", "http://localhost:8000").is_err());
    }
}
