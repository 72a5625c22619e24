//! Build orchestration.
//!
//! `Compiler` ties the pieces together: graph construction from the
//! configured entries, the transform pipeline per module, and emission.
//! Styles follow the original two-mode behavior: production extracts them
//! into a `.css` bundle next to the script bundle, development injects
//! them into the script bundle through a small runtime snippet.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Error};

use crate::config::Config;
use crate::emit::{Emitter, EmittedAsset};
use crate::graph::loader::{FsLoader, SourceLoader};
use crate::graph::{MediaType, ModuleGraph};
use crate::pipeline::{Pipeline, TransformContext};
use crate::resolver::Resolver;
use crate::text;

/// Summary of one build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub assets: Vec<EmittedAsset>,
    pub module_count: usize,
}

impl BuildReport {
    pub fn asset(&self, logical_name: &str) -> Option<&EmittedAsset> {
        self.assets
            .iter()
            .find(|asset| asset.logical_name == logical_name)
    }
}

pub struct Compiler {
    config: Config,
    pipeline: Pipeline,
}

impl Compiler {
    pub fn new(config: Config) -> Self {
        let pipeline = Pipeline::new(config.rules.clone());
        Self { config, pipeline }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Builds every bundle from the project directory.
    pub fn build(&self) -> Result<BuildReport, Error> {
        let loader = FsLoader::new(&self.config.root);
        self.build_with_loader(&loader, None)
    }

    /// Builds only the named bundles (incremental rebuilds).
    pub fn build_bundles(&self, only: &BTreeSet<String>) -> Result<BuildReport, Error> {
        let loader = FsLoader::new(&self.config.root);
        self.build_with_loader(&loader, Some(only))
    }

    /// Builds the module graph without emitting anything.
    pub fn module_graph(&self) -> Result<ModuleGraph, Error> {
        let loader = FsLoader::new(&self.config.root);
        let resolver = Resolver::new(&self.config.resolve);
        ModuleGraph::build(&self.config.entry, &resolver, &loader)
    }

    /// Full build against an explicit loader; `only` limits emission to a
    /// subset of bundles while still validating the whole graph.
    pub fn build_with_loader(
        &self,
        loader: &dyn SourceLoader,
        only: Option<&BTreeSet<String>>,
    ) -> Result<BuildReport, Error> {
        let resolver = Resolver::new(&self.config.resolve);
        let graph = ModuleGraph::build(&self.config.entry, &resolver, loader)?;

        let mut emitter = Emitter::new(&self.config);
        if self.config.clean_output_dir && only.is_none() {
            emitter.clean()?;
        }

        let ctx = TransformContext {
            mode: self.config.mode,
            public_path: self.config.output.public_path.clone(),
        };

        let mut report = BuildReport {
            module_count: graph.module_count(),
            ..Default::default()
        };

        for (bundle, module_paths) in graph.bundles() {
            if let Some(only) = only {
                if !only.contains(bundle) {
                    continue;
                }
            }
            self.build_bundle(bundle, module_paths, &graph, &ctx, &mut emitter, &mut report)
                .with_context(|| format!("failed to build bundle '{}'", bundle))?;
        }

        emitter.write_manifest()?;
        log::info!(
            "{} build emitted {} asset(s) from {} module(s)",
            self.config.mode,
            report.assets.len(),
            report.module_count
        );
        Ok(report)
    }

    fn build_bundle(
        &self,
        bundle: &str,
        module_paths: &[PathBuf],
        graph: &ModuleGraph,
        ctx: &TransformContext,
        emitter: &mut Emitter<'_>,
        report: &mut BuildReport,
    ) -> Result<(), Error> {
        let mut js = String::new();
        let mut css = String::new();

        for path in module_paths {
            let node = graph
                .get(path)
                .ok_or_else(|| anyhow::anyhow!("module '{}' missing from graph", path.display()))?;
            let transformed = self.pipeline.apply(&node.source, ctx)?;
            if let Some(file) = &transformed.emitted_file {
                report.assets.push(emitter.emit_file_asset(file)?);
            }
            match transformed.media_type {
                MediaType::JavaScript => {
                    js.push_str(std::str::from_utf8(&transformed.content).with_context(|| {
                        format!("module '{}' is not valid UTF-8", path.display())
                    })?);
                    js.push('\n');
                }
                MediaType::Css => {
                    css.push_str(std::str::from_utf8(&transformed.content).with_context(
                        || format!("module '{}' is not valid UTF-8", path.display()),
                    )?);
                    css.push('\n');
                }
                MediaType::Json => {
                    let source = std::str::from_utf8(&transformed.content).with_context(|| {
                        format!("module '{}' is not valid UTF-8", path.display())
                    })?;
                    js.push_str(&text::json_module(source));
                    js.push('\n');
                }
                other => {
                    log::debug!(
                        "module '{}' ({:?}) contributes no bundle output",
                        path.display(),
                        other
                    );
                }
            }
        }

        if !css.is_empty() {
            if self.config.mode.is_prod() {
                report.assets.push(emitter.emit_style_bundle(bundle, &css)?);
            } else {
                js.push_str(&inject_style_snippet(&css));
            }
        }

        if !js.is_empty() {
            report
                .assets
                .push(emitter.emit_script_bundle(bundle, &js, module_paths)?);
        }

        Ok(())
    }
}

/// Development style injection: appends the sheet to the document head at
/// runtime, standing in for an extracted `.css` file.
fn inject_style_snippet(css: &str) -> String {
    format!(
        "(function(){{var s=document.createElement(\"style\");\
         s.textContent=\"{}\";document.head.appendChild(s);}})();\n",
        text::escape_js_string(css)
    )
}
