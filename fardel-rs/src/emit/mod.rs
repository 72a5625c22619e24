//! Output emission.
//!
//! Names bundles through filename templates, writes them under the output
//! directory, and handles the production-only concerns: minification,
//! `manifest.json`, and cleaning the output directory before a build.
//! Development builds instead get stable filenames and a cheap
//! sources-only source map.
//!
//! - `template`: filename template parsing and rendering

pub mod template;

pub use template::{FilenameTemplate, Placeholder, TemplateInputs};

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Error};
use sha2::{Digest, Sha256};

use crate::config::{Config, SourceMapMode};
use crate::pipeline::EmittedFile;
use crate::text;

/// Hex-encoded SHA-256 digest, the content hash behind every `[hash]`
/// placeholder family.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// One file written during a build.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedAsset {
    /// Stable logical name, e.g. `app.js` or `logo.png`.
    pub logical_name: String,
    /// The rendered output filename.
    pub output_name: String,
    /// Public URL of the asset.
    pub public_url: String,
    pub size: u64,
}

/// Writes build output and accumulates the asset manifest.
pub struct Emitter<'a> {
    config: &'a Config,
    manifest: BTreeMap<String, String>,
}

impl<'a> Emitter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            manifest: BTreeMap::new(),
        }
    }

    fn out_dir(&self) -> PathBuf {
        self.config.root.join(&self.config.output.path)
    }

    /// Removes and recreates the output directory (production builds).
    pub fn clean(&self) -> Result<(), Error> {
        let dir = self.out_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to clean '{}'", dir.display()))?;
            log::info!("cleaned output directory '{}'", dir.display());
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create '{}'", dir.display()))?;
        Ok(())
    }

    /// Writes a bundle's script output, minified in production, with a
    /// source-map comment in development.
    pub fn emit_script_bundle(
        &mut self,
        bundle: &str,
        js: &str,
        module_paths: &[PathBuf],
    ) -> Result<EmittedAsset, Error> {
        let mut content = if self.config.minify {
            minify_js(js)
        } else {
            js.to_string()
        };

        let map = if self.config.source_map == SourceMapMode::Cheap {
            let map_name = format!("{}.js.map", bundle);
            let _ = write!(content, "\n//# sourceMappingURL={}", map_name);
            Some((map_name, cheap_source_map(bundle, module_paths)))
        } else {
            None
        };

        let hash = sha256_hex(content.as_bytes());
        let output_name = self.config.output.filename.render(&TemplateInputs {
            name: bundle,
            ext: "js",
            hash: Some(&hash),
            chunk_hash: Some(&hash),
            content_hash: Some(&hash),
        })?;

        if let Some((map_name, map)) = map {
            self.write(&map_name, map.as_bytes())?;
        }
        self.write_asset(&format!("{}.js", bundle), &output_name, content.as_bytes())
    }

    /// Writes a bundle's extracted style sheet (production builds).
    pub fn emit_style_bundle(&mut self, bundle: &str, css: &str) -> Result<EmittedAsset, Error> {
        let content = if self.config.minify {
            text::collapse_blank_lines(&text::strip_block_comments(css))
        } else {
            css.to_string()
        };
        let hash = sha256_hex(content.as_bytes());
        let output_name = self.config.output.css_filename.render(&TemplateInputs {
            name: bundle,
            ext: "css",
            hash: Some(&hash),
            chunk_hash: Some(&hash),
            content_hash: Some(&hash),
        })?;
        self.write_asset(&format!("{}.css", bundle), &output_name, content.as_bytes())
    }

    /// Writes a standalone asset produced by an asset stage.
    pub fn emit_file_asset(&mut self, file: &EmittedFile) -> Result<EmittedAsset, Error> {
        self.write_asset(&file.source_name, &file.name, &file.content)
    }

    fn write_asset(
        &mut self,
        logical_name: &str,
        output_name: &str,
        content: &[u8],
    ) -> Result<EmittedAsset, Error> {
        self.write(output_name, content)?;
        let public_url = format!("{}{}", self.config.output.public_path, output_name);
        self.manifest
            .insert(logical_name.to_string(), public_url.clone());
        log::info!("emitted {} ({} bytes)", output_name, content.len());
        Ok(EmittedAsset {
            logical_name: logical_name.to_string(),
            output_name: output_name.to_string(),
            public_url,
            size: content.len() as u64,
        })
    }

    fn write(&self, name: &str, content: &[u8]) -> Result<(), Error> {
        let path = self.out_dir().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write '{}'", path.display()))
    }

    /// Writes `manifest.json` mapping logical names to public URLs.
    /// Returns `None` when manifest generation is off (development).
    pub fn write_manifest(&self) -> Result<Option<PathBuf>, Error> {
        if !self.config.emit_manifest {
            return Ok(None);
        }
        let json = serde_json::to_string_pretty(&self.manifest)
            .context("failed to serialize manifest")?;
        self.write("manifest.json", json.as_bytes())?;
        Ok(Some(self.out_dir().join("manifest.json")))
    }

    pub fn manifest(&self) -> &BTreeMap<String, String> {
        &self.manifest
    }
}

/// A v3 source map carrying sources only, no mappings. Enough for the
/// browser to name the contributing files in development.
fn cheap_source_map(bundle: &str, module_paths: &[PathBuf]) -> String {
    let sources: Vec<String> = module_paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    serde_json::json!({
        "version": 3,
        "file": format!("{}.js", bundle),
        "sources": sources,
        "names": [],
        "mappings": "",
    })
    .to_string()
}

/// Whitespace-and-comment minification.
///
/// Comment markers inside string literals will confuse it; real
/// minification belongs to an external collaborator.
pub fn minify_js(source: &str) -> String {
    let source = text::strip_block_comments(source);
    let source = text::strip_comment_lines(&source, "//");
    text::collapse_blank_lines(&source)
}
