//! Output filename templates.
//!
//! Templates are strings with bracketed placeholders, e.g.
//! `[name].[chunkhash:8].js`. A placeholder may carry a `:len` suffix that
//! truncates the substituted value, which is how hashed filenames keep a
//! short digest segment.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Error};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The placeholder kinds a filename template may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// The logical bundle or asset name.
    Name,
    /// The source file extension, without the leading dot.
    Ext,
    /// Digest of a single file's contents.
    Hash,
    /// Digest of a whole bundle's contents.
    ChunkHash,
    /// Digest of the emitted asset's contents.
    ContentHash,
}

impl Placeholder {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "name" => Some(Self::Name),
            "ext" => Some(Self::Ext),
            "hash" => Some(Self::Hash),
            "chunkhash" => Some(Self::ChunkHash),
            "contenthash" => Some(Self::ContentHash),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Placeholder(Placeholder, Option<usize>),
}

/// A parsed output filename template.
///
/// Parsing fails fast on unknown placeholder names and malformed brackets so
/// a bad template is reported at configuration time, not mid-emit.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenameTemplate {
    raw: String,
    parts: Vec<Part>,
}

/// Values substituted into a template by [`FilenameTemplate::render`].
///
/// Hash values are full hex digests; truncation is applied per placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateInputs<'a> {
    pub name: &'a str,
    pub ext: &'a str,
    pub hash: Option<&'a str>,
    pub chunk_hash: Option<&'a str>,
    pub content_hash: Option<&'a str>,
}

impl FilenameTemplate {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.is_empty() {
            bail!("filename template is empty");
        }
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;
        while let Some(open) = rest.find('[') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find(']') else {
                bail!("unclosed placeholder in filename template '{}'", raw);
            };
            let inner = &after[..close];
            let (name, len) = match inner.split_once(':') {
                Some((name, len)) => {
                    let len: usize = len.parse().map_err(|_| {
                        anyhow::anyhow!(
                            "invalid length '{}' in placeholder '[{}]' of template '{}'",
                            len,
                            inner,
                            raw
                        )
                    })?;
                    if len == 0 || len > 64 {
                        bail!(
                            "placeholder length must be between 1 and 64 in template '{}'",
                            raw
                        );
                    }
                    (name, Some(len))
                }
                None => (inner, None),
            };
            let Some(placeholder) = Placeholder::parse(name) else {
                bail!(
                    "unknown placeholder '[{}]' in filename template '{}'",
                    inner,
                    raw
                );
            };
            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Placeholder(placeholder, len));
            rest = &after[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }
        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn has_placeholder(&self, placeholder: Placeholder) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::Placeholder(kind, _) if *kind == placeholder))
    }

    /// True if the template embeds any digest placeholder.
    pub fn has_hash(&self) -> bool {
        self.has_placeholder(Placeholder::Hash)
            || self.has_placeholder(Placeholder::ChunkHash)
            || self.has_placeholder(Placeholder::ContentHash)
    }

    pub fn render(&self, inputs: &TemplateInputs<'_>) -> Result<String, Error> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(kind, len) => {
                    let value = match kind {
                        Placeholder::Name => inputs.name,
                        Placeholder::Ext => inputs.ext,
                        Placeholder::Hash => inputs.hash.ok_or_else(|| {
                            anyhow::anyhow!("template '{}' requires a file hash", self.raw)
                        })?,
                        Placeholder::ChunkHash => inputs.chunk_hash.ok_or_else(|| {
                            anyhow::anyhow!("template '{}' requires a chunk hash", self.raw)
                        })?,
                        Placeholder::ContentHash => inputs.content_hash.ok_or_else(|| {
                            anyhow::anyhow!("template '{}' requires a content hash", self.raw)
                        })?,
                    };
                    match len {
                        Some(len) => out.push_str(&value[..(*len).min(value.len())]),
                        None => out.push_str(value),
                    }
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for FilenameTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for FilenameTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for FilenameTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_plain() {
        let template = FilenameTemplate::parse("[name].js").unwrap();
        let rendered = template
            .render(&TemplateInputs {
                name: "app",
                ext: "js",
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rendered, "app.js");
        assert!(!template.has_hash());
    }

    #[test]
    fn test_render_truncated_hash() {
        let template = FilenameTemplate::parse("[name].[chunkhash:8].js").unwrap();
        let rendered = template
            .render(&TemplateInputs {
                name: "app",
                ext: "js",
                chunk_hash: Some("0123456789abcdef"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rendered, "app.01234567.js");
        assert!(template.has_hash());
    }

    #[test]
    fn test_render_asset_name() {
        let template = FilenameTemplate::parse("[name].[hash:7].[ext]").unwrap();
        let rendered = template
            .render(&TemplateInputs {
                name: "logo",
                ext: "png",
                hash: Some("fedcba9876543210"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rendered, "logo.fedcba9.png");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let err = FilenameTemplate::parse("[name].[checksum].js").unwrap_err();
        assert!(err.to_string().contains("[checksum]"));
    }

    #[test]
    fn test_unclosed_placeholder_rejected() {
        assert!(FilenameTemplate::parse("[name.js").is_err());
    }

    #[test]
    fn test_missing_hash_input_fails() {
        let template = FilenameTemplate::parse("[name].[contenthash:8].css").unwrap();
        let err = template
            .render(&TemplateInputs {
                name: "app",
                ext: "css",
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("content hash"));
    }
}
