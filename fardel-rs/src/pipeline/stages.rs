//! The `Transform` seam and the built-in stage collaborators.
//!
//! Each [`Stage`](super::Stage) variant maps to one `Transform`
//! implementation. The built-ins are deliberately thin: they do honest but
//! minimal work so the pipeline runs end to end, and each is the seam
//! where a real compiler (TypeScript, Sass, an image optimizer) plugs in.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::{
    AssetOptions, EmitFileOptions, LintOptions, RuleSet, Stage, StyleDialect, StyleOptions,
    TypeCheckOptions, VendorPrefixOptions,
};
use crate::config::Mode;
use crate::emit::template::{FilenameTemplate, TemplateInputs};
use crate::emit::sha256_hex;
use crate::graph::{mime_for_path, MediaType, ModuleSource};
use crate::text;

/// Build-wide inputs the stages need.
#[derive(Debug, Clone)]
pub struct TransformContext {
    pub mode: Mode,
    /// Public URL prefix for emitted asset references.
    pub public_path: String,
}

/// A module flowing through a chain.
#[derive(Debug, Clone)]
pub struct TransformedModule {
    pub path: PathBuf,
    pub media_type: MediaType,
    pub content: Vec<u8>,
    /// A standalone file the emitter must write (emitted assets).
    pub emitted_file: Option<EmittedFile>,
}

/// A file produced by an asset stage, named by its stage's template.
#[derive(Debug, Clone)]
pub struct EmittedFile {
    /// The original filename, used as the manifest key.
    pub source_name: String,
    /// The rendered output filename.
    pub name: String,
    pub content: Vec<u8>,
}

/// One swappable transform collaborator.
pub trait Transform {
    fn name(&self) -> &'static str;
    fn apply(
        &self,
        module: TransformedModule,
        ctx: &TransformContext,
    ) -> Result<TransformedModule, Error>;
}

/// Applies the matching chain to each module.
#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: RuleSet,
}

impl Pipeline {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Runs a module through its chain; unmatched extensions pass through.
    pub fn apply(
        &self,
        source: &ModuleSource,
        ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        let mut module = TransformedModule {
            path: source.path.clone(),
            media_type: source.media_type,
            content: source.content.clone(),
            emitted_file: None,
        };
        let Some(rule) = self.rules.chain_for(&source.path) else {
            return Ok(module);
        };
        for stage in &rule.stages {
            let transform = transform_for(stage);
            module = transform.apply(module, ctx).with_context(|| {
                format!(
                    "stage '{}' failed for module '{}'",
                    transform.name(),
                    source.path.display()
                )
            })?;
        }
        Ok(module)
    }
}

fn transform_for(stage: &Stage) -> Box<dyn Transform> {
    match stage {
        Stage::Lint(options) => Box::new(LintStage {
            options: options.clone(),
        }),
        Stage::Transpile(_) => Box::new(TranspileStage),
        Stage::TypeCheck(options) => Box::new(TypeCheckStage {
            options: options.clone(),
        }),
        Stage::CompileStyles(options) => Box::new(CompileStylesStage {
            options: options.clone(),
        }),
        Stage::VendorPrefix(options) => Box::new(VendorPrefixStage {
            options: options.clone(),
        }),
        Stage::InlineAssets(options) => Box::new(InlineAssetsStage {
            options: options.clone(),
        }),
        Stage::EmitFile(options) => Box::new(EmitFileStage {
            options: options.clone(),
        }),
    }
}

fn utf8_content<'a>(module: &'a TransformedModule, stage: &str) -> Result<&'a str, Error> {
    std::str::from_utf8(&module.content).with_context(|| {
        format!(
            "stage '{}' needs text input but '{}' is not valid UTF-8",
            stage,
            module.path.display()
        )
    })
}

/// Scans script sources for a small set of leftover-debugging patterns.
struct LintStage {
    options: LintOptions,
}

impl Transform for LintStage {
    fn name(&self) -> &'static str {
        "lint"
    }

    fn apply(
        &self,
        module: TransformedModule,
        _ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        let source = utf8_content(&module, self.name())?;
        let mut findings = Vec::new();
        for (number, line) in source.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("debugger") {
                findings.push(format!("line {}: unexpected 'debugger' statement", number + 1));
            }
            if trimmed.contains("alert(") {
                findings.push(format!("line {}: unexpected 'alert' call", number + 1));
            }
        }
        if findings.is_empty() {
            return Ok(module);
        }
        if self.options.fail_on_warnings {
            bail!("{} lint finding(s): {}", findings.len(), findings.join("; "));
        }
        for finding in &findings {
            log::warn!("lint ({}): {}", module.path.display(), finding);
        }
        Ok(module)
    }
}

/// Retargets a script module to plain JavaScript.
///
/// For TypeScript input this only drops type-only lines (`import type`,
/// `export type`, `declare`); real annotation erasure is the compiler
/// collaborator's job.
struct TranspileStage;

impl Transform for TranspileStage {
    fn name(&self) -> &'static str {
        "transpile"
    }

    fn apply(
        &self,
        mut module: TransformedModule,
        _ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        if matches!(module.media_type, MediaType::TypeScript | MediaType::Tsx) {
            let source = utf8_content(&module, self.name())?;
            let mut out = String::with_capacity(source.len());
            for line in source.lines() {
                let trimmed = line.trim_start();
                if trimmed.starts_with("import type ")
                    || trimmed.starts_with("export type ")
                    || trimmed.starts_with("declare ")
                {
                    continue;
                }
                out.push_str(line);
                out.push('\n');
            }
            module.content = out.into_bytes();
        }
        module.media_type = MediaType::JavaScript;
        Ok(module)
    }
}

/// Flags explicit `any` annotations; the type checker proper is external.
struct TypeCheckStage {
    options: TypeCheckOptions,
}

impl Transform for TypeCheckStage {
    fn name(&self) -> &'static str {
        "type-check"
    }

    fn apply(
        &self,
        module: TransformedModule,
        _ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        log::debug!(
            "type-check '{}' against '{}'",
            module.path.display(),
            self.options.config_file
        );
        let source = utf8_content(&module, self.name())?;
        let mut findings = Vec::new();
        for (number, line) in source.lines().enumerate() {
            if line.contains(": any") {
                findings.push(format!("line {}: explicit 'any' annotation", number + 1));
            }
        }
        if findings.is_empty() {
            return Ok(module);
        }
        if self.options.emit_errors {
            bail!(
                "{} type finding(s): {}",
                findings.len(),
                findings.join("; ")
            );
        }
        for finding in &findings {
            log::warn!("type-check ({}): {}", module.path.display(), finding);
        }
        Ok(module)
    }
}

/// Compiles a style sheet down to plain CSS.
///
/// The Sass dialect handling is limited to `//` comments and flat `$var`
/// substitution; nesting and mixins belong to a real Sass collaborator.
struct CompileStylesStage {
    options: StyleOptions,
}

impl Transform for CompileStylesStage {
    fn name(&self) -> &'static str {
        "compile-styles"
    }

    fn apply(
        &self,
        mut module: TransformedModule,
        _ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        let source = utf8_content(&module, self.name())?.to_string();
        let mut css = match self.options.dialect {
            StyleDialect::Css => source,
            StyleDialect::Sass => compile_sass(&source)?,
        };
        if self.options.minimize {
            css = text::collapse_blank_lines(&text::strip_block_comments(&css));
        }
        module.content = css.into_bytes();
        module.media_type = MediaType::Css;
        Ok(module)
    }
}

fn compile_sass(source: &str) -> Result<String, Error> {
    let source = text::strip_comment_lines(source, "//");

    // Collect flat `$name: value;` declarations
    let mut variables: Vec<(String, String)> = Vec::new();
    let mut body = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix('$') {
            if let Some((name, value)) = rest.split_once(':') {
                let name = name.trim();
                if !name.is_empty() && !name.contains(' ') {
                    variables.push((
                        format!("${}", name),
                        value.trim().trim_end_matches(';').trim().to_string(),
                    ));
                    continue;
                }
            }
        }
        body.push_str(line);
        body.push('\n');
    }

    // Substitute longest names first so `$color-dark` wins over `$color`
    variables.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    let mut css = body;
    for (name, value) in &variables {
        css = css.replace(name.as_str(), value);
    }
    if let Some(stray) = css.find('$') {
        let line = css[..stray].lines().count().max(1);
        bail!("undefined style variable near line {}", line);
    }
    Ok(css)
}

/// Duplicates a fixed set of properties with `-webkit-`/`-ms-` prefixes.
struct VendorPrefixStage {
    options: VendorPrefixOptions,
}

const PREFIXED_PROPERTIES: &[&str] = &["appearance", "user-select", "transform", "transition"];

impl Transform for VendorPrefixStage {
    fn name(&self) -> &'static str {
        "vendor-prefix"
    }

    fn apply(
        &self,
        mut module: TransformedModule,
        _ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        log::debug!(
            "vendor-prefix '{}' targeting [{}]",
            module.path.display(),
            self.options.browsers.join(", ")
        );
        let source = utf8_content(&module, self.name())?;
        let mut out = String::with_capacity(source.len());
        for line in source.lines() {
            let trimmed = line.trim_start();
            let prefixable = PREFIXED_PROPERTIES.iter().find(|property| {
                trimmed
                    .strip_prefix(**property)
                    .is_some_and(|rest| rest.trim_start().starts_with(':'))
            });
            if let Some(property) = prefixable {
                let indent = &line[..line.len() - trimmed.len()];
                let suffix = &trimmed[property.len()..];
                out.push_str(&format!("{}-webkit-{}{}\n", indent, property, suffix));
                out.push_str(&format!("{}-ms-{}{}\n", indent, property, suffix));
            }
            out.push_str(line);
            out.push('\n');
        }
        module.content = out.into_bytes();
        Ok(module)
    }
}

fn asset_export(url: &str) -> Vec<u8> {
    format!("export default \"{}\";\n", url).into_bytes()
}

fn render_asset_name(
    template: &str,
    path: &Path,
    content: &[u8],
) -> Result<String, Error> {
    let template = FilenameTemplate::parse(template)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let hash = sha256_hex(content);
    template.render(&TemplateInputs {
        name,
        ext,
        hash: Some(&hash),
        ..Default::default()
    })
}

/// Inlines small assets as data URIs; larger ones become emitted files.
struct InlineAssetsStage {
    options: AssetOptions,
}

impl Transform for InlineAssetsStage {
    fn name(&self) -> &'static str {
        "inline-assets"
    }

    fn apply(
        &self,
        mut module: TransformedModule,
        ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        if self.options.optimize {
            // Seam for an image-optimizer collaborator; bytes pass through
            log::debug!("asset optimization requested for '{}'", module.path.display());
        }
        if module.content.len() as u64 <= self.options.inline_limit {
            let uri = format!(
                "data:{};base64,{}",
                mime_for_path(&module.path),
                BASE64.encode(&module.content)
            );
            module.content = asset_export(&uri);
        } else {
            let name = render_asset_name(&self.options.name, &module.path, &module.content)?;
            let url = format!("{}{}", ctx.public_path, name);
            module.emitted_file = Some(EmittedFile {
                source_name: module
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| name.clone()),
                name,
                content: std::mem::take(&mut module.content),
            });
            module.content = asset_export(&url);
        }
        module.media_type = MediaType::JavaScript;
        Ok(module)
    }
}

/// Always emits the asset as a file (fonts).
struct EmitFileStage {
    options: EmitFileOptions,
}

impl Transform for EmitFileStage {
    fn name(&self) -> &'static str {
        "emit-file"
    }

    fn apply(
        &self,
        mut module: TransformedModule,
        ctx: &TransformContext,
    ) -> Result<TransformedModule, Error> {
        let name = render_asset_name(&self.options.name, &module.path, &module.content)?;
        let url = format!("{}{}", ctx.public_path, name);
        module.emitted_file = Some(EmittedFile {
            source_name: module
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone()),
            name,
            content: std::mem::take(&mut module.content),
        });
        module.content = asset_export(&url);
        module.media_type = MediaType::JavaScript;
        Ok(module)
    }
}
