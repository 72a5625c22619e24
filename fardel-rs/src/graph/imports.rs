//! Import extraction per media type.
//!
//! A deliberately shallow, regex-based scan: enough to trace ES `import`
//! and `export ... from` clauses, CommonJS `require`, and CSS `@import` /
//! `url(...)` references in well-formed sources. Full-fidelity parsing is
//! an external compiler's job.

use regex::Regex;

use super::MediaType;

lazy_static! {
    // `import './x'`, `import d from './x'`, `import {a, b} from './x'`,
    // `import * as ns from './x'`; group 1 catches type-only imports.
    static ref ES_IMPORT_RE: Regex = Regex::new(
        r#"(?m)^\s*import\s+(type\s+)?(?:[^'";]*?from\s*)?["']([^"']+)["']"#
    )
    .unwrap();
    static ref ES_EXPORT_FROM_RE: Regex = Regex::new(
        r#"(?m)^\s*export\s+(type\s+)?(?:\*(?:\s+as\s+\w+)?|\{[^}]*\})\s*from\s*["']([^"']+)["']"#
    )
    .unwrap();
    static ref REQUIRE_RE: Regex = Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap();
    static ref CSS_IMPORT_RE: Regex =
        Regex::new(r#"@import\s+(?:url\(\s*)?["']?([^"'()\s;]+)"#).unwrap();
    static ref CSS_URL_RE: Regex = Regex::new(r#"url\(\s*["']?([^"')]+?)["']?\s*\)"#).unwrap();
}

/// Extracts the ordered, deduplicated import specifiers of a module.
pub fn extract_imports(media_type: MediaType, source: &str) -> Vec<String> {
    let mut specifiers: Vec<String> = Vec::new();
    let mut push = |specifier: &str| {
        let specifier = specifier.trim();
        if specifier.is_empty() || is_external(specifier) {
            return;
        }
        if !specifiers.iter().any(|s| s == specifier) {
            specifiers.push(specifier.to_string());
        }
    };

    match media_type {
        MediaType::JavaScript | MediaType::TypeScript | MediaType::Tsx => {
            for caps in ES_IMPORT_RE.captures_iter(source) {
                if caps.get(1).is_none() {
                    push(&caps[2]);
                }
            }
            for caps in ES_EXPORT_FROM_RE.captures_iter(source) {
                if caps.get(1).is_none() {
                    push(&caps[2]);
                }
            }
            for caps in REQUIRE_RE.captures_iter(source) {
                push(&caps[1]);
            }
        }
        MediaType::Css | MediaType::Scss => {
            for caps in CSS_IMPORT_RE.captures_iter(source) {
                push(&caps[1]);
            }
            for caps in CSS_URL_RE.captures_iter(source) {
                push(&caps[1]);
            }
        }
        _ => {}
    }

    specifiers
}

/// References the graph never follows: remote URLs, inline data, fragments.
fn is_external(specifier: &str) -> bool {
    specifier.starts_with("http://")
        || specifier.starts_with("https://")
        || specifier.starts_with("//")
        || specifier.starts_with("data:")
        || specifier.starts_with('#')
}
