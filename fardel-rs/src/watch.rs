//! Watch mode: incremental rebuilds on file change.
//!
//! `InvalidationIndex` is the pure half: derived from a built module
//! graph, it maps a set of changed source files to the set of bundles
//! whose output is stale, through the graph's reverse-dependency closure.
//! `Watcher` is the filesystem half: a notify watcher over the project
//! root that coalesces bursts of change events and rebuilds only the
//! affected bundles.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Error};
use notify::{EventKind, RecursiveMode, Watcher as _};

use crate::compiler::Compiler;
use crate::graph::ModuleGraph;

/// Maps changed source files to the bundles that must be rebuilt.
#[derive(Debug, Clone, Default)]
pub struct InvalidationIndex {
    /// Module to the bundles containing it.
    bundles_of: BTreeMap<PathBuf, BTreeSet<String>>,
    /// Direct reverse dependency edges.
    importers_of: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
}

impl InvalidationIndex {
    pub fn from_graph(graph: &ModuleGraph) -> Self {
        let mut index = Self::default();
        for (bundle, modules) in graph.bundles() {
            for module in modules {
                index
                    .bundles_of
                    .entry(module.clone())
                    .or_default()
                    .insert(bundle.clone());
            }
        }
        for node in graph.modules() {
            for dep in &node.deps {
                index
                    .importers_of
                    .entry(dep.clone())
                    .or_default()
                    .insert(node.source.path.clone());
            }
        }
        index
    }

    /// The bundles stale after the given files changed.
    ///
    /// Walks reverse edges transitively, so editing a leaf module
    /// invalidates every bundle that reaches it. Unknown paths are
    /// ignored.
    pub fn affected_bundles<I>(&self, changed: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut affected = BTreeSet::new();
        let mut queue: Vec<PathBuf> = changed.into_iter().collect();
        let mut seen = BTreeSet::new();
        while let Some(path) = queue.pop() {
            if !seen.insert(path.clone()) {
                continue;
            }
            if let Some(bundles) = self.bundles_of.get(&path) {
                affected.extend(bundles.iter().cloned());
            }
            if let Some(importers) = self.importers_of.get(&path) {
                queue.extend(importers.iter().cloned());
            }
        }
        affected
    }

    pub fn tracks(&self, path: &Path) -> bool {
        self.bundles_of.contains_key(path)
    }
}

/// Debounce window for coalescing editor save bursts.
const DEBOUNCE: Duration = Duration::from_millis(150);

/// Runs a full build, then rebuilds affected bundles on change until the
/// watch channel closes.
pub struct Watcher {
    compiler: Compiler,
}

impl Watcher {
    pub fn new(compiler: Compiler) -> Self {
        Self { compiler }
    }

    pub fn run(&self) -> Result<(), Error> {
        self.compiler.build()?;
        let mut index = InvalidationIndex::from_graph(&self.compiler.module_graph()?);

        let root = std::fs::canonicalize(&self.compiler.config().root)
            .context("failed to canonicalize project root")?;
        let out_dir = root.join(&self.compiler.config().output.path);

        let (tx, rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(tx).context("failed to create file watcher")?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch '{}'", root.display()))?;
        log::info!("watching '{}' for changes", root.display());

        loop {
            let first = match rx.recv() {
                Ok(event) => event,
                Err(_) => return Ok(()),
            };
            let mut changed = BTreeSet::new();
            self.collect(first, &root, &out_dir, &mut changed);
            // Coalesce the rest of the burst
            while let Ok(event) = rx.recv_timeout(DEBOUNCE) {
                self.collect(event, &root, &out_dir, &mut changed);
            }
            if changed.is_empty() {
                continue;
            }

            let affected = index.affected_bundles(changed.iter().cloned());
            if affected.is_empty() {
                log::debug!("change outside the module graph, skipping rebuild");
                continue;
            }
            log::info!(
                "rebuilding {} bundle(s): {}",
                affected.len(),
                affected.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            match self.compiler.build_bundles(&affected) {
                Ok(_) => match self.compiler.module_graph() {
                    Ok(graph) => index = InvalidationIndex::from_graph(&graph),
                    Err(err) => log::warn!("graph refresh failed: {:#}", err),
                },
                // Keep watching; the next save can fix the build
                Err(err) => log::warn!("rebuild failed: {:#}", err),
            }
        }
    }

    fn collect(
        &self,
        event: Result<notify::Event, notify::Error>,
        root: &Path,
        out_dir: &Path,
        changed: &mut BTreeSet<PathBuf>,
    ) {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                log::warn!("watch error: {}", err);
                return;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        for path in event.paths {
            // Never rebuild because of our own output
            if path.starts_with(out_dir) {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                changed.insert(relative.to_path_buf());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolveConfig;
    use crate::graph::loader::MemoryLoader;
    use crate::resolver::Resolver;

    fn graph() -> ModuleGraph {
        let loader = MemoryLoader::default()
            .with_file("assets/js/app.js", "import './shared.js';\n")
            .with_file("assets/js/admin.js", "import './shared.js';\n")
            .with_file("assets/js/shared.js", "export const s = 1;\n")
            .with_file("assets/js/solo.js", "export {};\n");
        let mut entries = BTreeMap::new();
        entries.insert("app".to_string(), vec![PathBuf::from("./assets/js/app.js")]);
        entries.insert(
            "admin".to_string(),
            vec![PathBuf::from("./assets/js/admin.js")],
        );
        entries.insert(
            "solo".to_string(),
            vec![PathBuf::from("./assets/js/solo.js")],
        );
        let resolver = Resolver::new(&ResolveConfig {
            alias: BTreeMap::new(),
            extensions: vec![".js".to_string()],
        });
        ModuleGraph::build(&entries, &resolver, &loader).unwrap()
    }

    #[test]
    fn test_shared_module_invalidates_both_bundles() {
        let index = InvalidationIndex::from_graph(&graph());
        let affected =
            index.affected_bundles([PathBuf::from("assets/js/shared.js")]);
        assert_eq!(
            affected,
            BTreeSet::from(["app".to_string(), "admin".to_string()])
        );
    }

    #[test]
    fn test_entry_change_invalidates_only_its_bundle() {
        let index = InvalidationIndex::from_graph(&graph());
        let affected = index.affected_bundles([PathBuf::from("assets/js/solo.js")]);
        assert_eq!(affected, BTreeSet::from(["solo".to_string()]));
    }

    #[test]
    fn test_unknown_path_affects_nothing() {
        let index = InvalidationIndex::from_graph(&graph());
        assert!(index
            .affected_bundles([PathBuf::from("README.md")])
            .is_empty());
        assert!(!index.tracks(Path::new("README.md")));
    }
}
