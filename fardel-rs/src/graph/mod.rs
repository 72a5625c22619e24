//! Module graph construction.
//!
//! The graph builder resolves every declared entry point to a source file,
//! scans each file for imports, and follows them until the dependency
//! closure of every bundle is loaded. Bundles keep their modules in
//! dependency-first order so concatenated output defines a module before
//! its importers run.
//!
//! - `loader`: the `SourceLoader` seam serving module bytes (disk or memory)
//! - `imports`: per-media-type import extraction

pub mod imports;
pub mod loader;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use crate::resolver::Resolver;
use loader::SourceLoader;

/// Media type of a source module, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaType {
    JavaScript,
    TypeScript,
    Tsx,
    Css,
    Scss,
    Json,
    Image,
    Font,
    Other,
}

impl MediaType {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "js" | "mjs" | "cjs" | "jsx" => Self::JavaScript,
            "ts" | "mts" | "cts" => Self::TypeScript,
            "tsx" => Self::Tsx,
            "css" => Self::Css,
            "scss" | "sass" => Self::Scss,
            "json" => Self::Json,
            "png" | "jpg" | "jpeg" | "gif" | "svg" => Self::Image,
            "woff" | "woff2" | "eot" | "ttf" | "otf" => Self::Font,
            _ => Self::Other,
        }
    }

    /// True for module kinds whose source is scanned for imports.
    pub fn is_scannable(self) -> bool {
        matches!(
            self,
            Self::JavaScript | Self::TypeScript | Self::Tsx | Self::Css | Self::Scss
        )
    }

    pub fn is_script(self) -> bool {
        matches!(self, Self::JavaScript | Self::TypeScript | Self::Tsx)
    }

    pub fn is_style(self) -> bool {
        matches!(self, Self::Css | Self::Scss)
    }
}

/// MIME type for a source path, used when inlining assets as data URIs.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "eot" => "application/vnd.ms-fontobject",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// A loaded source module.
#[derive(Debug, Clone)]
pub struct ModuleSource {
    /// Project-root-relative, normalized path; doubles as the module id.
    pub path: PathBuf,
    pub media_type: MediaType,
    pub content: Vec<u8>,
}

/// A graph node: a module plus its resolved dependency edges in source order.
#[derive(Debug, Clone)]
pub struct ModuleNode {
    pub source: ModuleSource,
    pub deps: Vec<PathBuf>,
}

/// The dependency graph of every bundle in a build.
#[derive(Debug, Clone, Default)]
pub struct ModuleGraph {
    modules: BTreeMap<PathBuf, ModuleNode>,
    bundles: BTreeMap<String, Vec<PathBuf>>,
}

impl ModuleGraph {
    /// Builds the graph for all bundles, breadth-first from their entries.
    ///
    /// Fails on the first unresolvable import, naming the importer and the
    /// specifier so the offending line can be found.
    pub fn build(
        entries: &BTreeMap<String, Vec<PathBuf>>,
        resolver: &Resolver,
        loader: &dyn SourceLoader,
    ) -> Result<Self, Error> {
        let mut graph = Self::default();
        let mut bundle_roots: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();

        for (bundle, modules) in entries {
            let mut roots = Vec::new();
            for specifier in modules {
                let specifier = specifier.to_string_lossy();
                let path = graph
                    .resolve_and_load(&specifier, None, resolver, loader)
                    .with_context(|| {
                        format!("failed to resolve entry '{}' of bundle '{}'", specifier, bundle)
                    })?;
                roots.push(path);
            }
            bundle_roots.insert(bundle.clone(), roots);
        }

        // Load the dependency closure of every root
        let mut queue: VecDeque<PathBuf> = graph.modules.keys().cloned().collect();
        let mut scanned: BTreeSet<PathBuf> = BTreeSet::new();
        while let Some(path) = queue.pop_front() {
            if !scanned.insert(path.clone()) {
                continue;
            }
            let (media_type, source) = {
                let node = &graph.modules[&path];
                if !node.source.media_type.is_scannable() {
                    continue;
                }
                (
                    node.source.media_type,
                    String::from_utf8_lossy(&node.source.content).into_owned(),
                )
            };
            let specifiers = imports::extract_imports(media_type, &source);
            let mut deps = Vec::new();
            for specifier in &specifiers {
                let dep = graph
                    .resolve_and_load(specifier, Some(&path), resolver, loader)
                    .with_context(|| {
                        format!(
                            "cannot resolve '{}' imported from '{}'",
                            specifier,
                            path.display()
                        )
                    })?;
                queue.push_back(dep.clone());
                deps.push(dep);
            }
            if let Some(node) = graph.modules.get_mut(&path) {
                node.deps = deps;
            }
        }

        // Dependency-first ordering per bundle
        for (bundle, roots) in bundle_roots {
            let mut seen = BTreeSet::new();
            let mut order = Vec::new();
            for root in roots {
                graph.walk_post_order(&root, &mut seen, &mut order);
            }
            log::debug!("bundle '{}' has {} module(s)", bundle, order.len());
            graph.bundles.insert(bundle, order);
        }

        Ok(graph)
    }

    /// Resolves a specifier and loads the winning candidate into the graph.
    fn resolve_and_load(
        &mut self,
        specifier: &str,
        importer: Option<&Path>,
        resolver: &Resolver,
        loader: &dyn SourceLoader,
    ) -> Result<PathBuf, Error> {
        let candidates = resolver.candidates(specifier, importer)?;
        for candidate in &candidates {
            if self.modules.contains_key(candidate) {
                return Ok(candidate.clone());
            }
            if let Some(content) = loader.load(candidate)? {
                let source = ModuleSource {
                    path: candidate.clone(),
                    media_type: MediaType::from_path(candidate),
                    content,
                };
                self.modules.insert(
                    candidate.clone(),
                    ModuleNode {
                        source,
                        deps: Vec::new(),
                    },
                );
                return Ok(candidate.clone());
            }
        }
        bail!(
            "no file found for '{}' (tried {} candidate path(s))",
            specifier,
            candidates.len()
        )
    }

    fn walk_post_order(&self, path: &Path, seen: &mut BTreeSet<PathBuf>, order: &mut Vec<PathBuf>) {
        if !seen.insert(path.to_path_buf()) {
            // Already emitted, or an import cycle back to an ancestor
            return;
        }
        if let Some(node) = self.modules.get(path) {
            for dep in node.deps.clone() {
                self.walk_post_order(&dep, seen, order);
            }
        }
        order.push(path.to_path_buf());
    }

    pub fn get(&self, path: &Path) -> Option<&ModuleNode> {
        self.modules.get(path)
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleNode> {
        self.modules.values()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Bundle name to dependency-first module list.
    pub fn bundles(&self) -> &BTreeMap<String, Vec<PathBuf>> {
        &self.bundles
    }

    /// Ordered module list for one bundle.
    pub fn modules_of(&self, bundle: &str) -> Option<&[PathBuf]> {
        self.bundles.get(bundle).map(|paths| paths.as_slice())
    }

    /// Transitive reverse-dependency closure of a module, itself included.
    ///
    /// This is the set of modules whose output is stale when `path` changes.
    pub fn dependents_of(&self, path: &Path) -> BTreeSet<PathBuf> {
        let mut reverse: BTreeMap<&Path, Vec<&Path>> = BTreeMap::new();
        for (importer, node) in &self.modules {
            for dep in &node.deps {
                reverse.entry(dep.as_path()).or_default().push(importer);
            }
        }
        let mut affected = BTreeSet::new();
        let mut queue = VecDeque::from([path.to_path_buf()]);
        while let Some(current) = queue.pop_front() {
            if !affected.insert(current.clone()) {
                continue;
            }
            if let Some(importers) = reverse.get(current.as_path()) {
                for importer in importers {
                    queue.push_back(importer.to_path_buf());
                }
            }
        }
        affected
    }
}
