//! Per-extension transform chains.
//!
//! A `RuleSet` maps file extensions to an ordered chain of [`Stage`]s.
//! Stages are a closed set of typed variants rather than loosely-typed
//! stage-name strings, so an ill-formed chain is rejected when the
//! configuration is built instead of deep inside a build.
//!
//! - `stages`: the `Transform` trait seam and the built-in collaborators

mod stages;

pub use stages::{EmittedFile, Pipeline, Transform, TransformContext, TransformedModule};

use std::path::Path;

use anyhow::{bail, Error};
use serde::{Deserialize, Serialize};

use crate::config::Mode;

/// One transform stage with its typed option record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum Stage {
    Lint(LintOptions),
    Transpile(TranspileOptions),
    TypeCheck(TypeCheckOptions),
    CompileStyles(StyleOptions),
    VendorPrefix(VendorPrefixOptions),
    InlineAssets(AssetOptions),
    EmitFile(EmitFileOptions),
}

impl Stage {
    /// The stage name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lint(_) => "lint",
            Self::Transpile(_) => "transpile",
            Self::TypeCheck(_) => "type-check",
            Self::CompileStyles(_) => "compile-styles",
            Self::VendorPrefix(_) => "vendor-prefix",
            Self::InlineAssets(_) => "inline-assets",
            Self::EmitFile(_) => "emit-file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LintOptions {
    /// Fail the build on lint findings instead of logging them.
    pub fail_on_warnings: bool,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            fail_on_warnings: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptDialect {
    EcmaScript,
    TypeScript,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranspileOptions {
    pub dialect: ScriptDialect,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            dialect: ScriptDialect::EcmaScript,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeCheckOptions {
    pub config_file: String,
    /// Turn findings into build errors rather than warnings.
    pub emit_errors: bool,
}

impl Default for TypeCheckOptions {
    fn default() -> Self {
        Self {
            config_file: "tsconfig.json".to_string(),
            emit_errors: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleDialect {
    Css,
    Sass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StyleOptions {
    pub dialect: StyleDialect,
    /// How many chained stages imported sheets pass through again.
    pub import_depth: u32,
    pub minimize: bool,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            dialect: StyleDialect::Css,
            import_depth: 1,
            minimize: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorPrefixOptions {
    /// Browser support targets, recorded for the real prefixer collaborator.
    pub browsers: Vec<String>,
}

impl Default for VendorPrefixOptions {
    fn default() -> Self {
        Self {
            browsers: vec![
                "last 2 versions".to_string(),
                "safari >= 7".to_string(),
                "ie >= 8".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetOptions {
    /// Assets at or under this byte size become inline data URIs.
    pub inline_limit: u64,
    /// Filename template for assets that are emitted instead of inlined.
    pub name: String,
    pub optimize: bool,
}

impl Default for AssetOptions {
    fn default() -> Self {
        Self {
            inline_limit: 8192,
            name: "[name].[hash:7].[ext]".to_string(),
            optimize: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmitFileOptions {
    pub name: String,
}

impl Default for EmitFileOptions {
    fn default() -> Self {
        Self {
            name: "[name].[hash:8].[ext]".to_string(),
        }
    }
}

/// A set of file extensions and the ordered stage chain applied to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Extensions without the leading dot, e.g. `["ts", "tsx"]`.
    pub extensions: Vec<String>,
    pub stages: Vec<Stage>,
}

/// All transform rules of a build, one chain per extension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Validates and builds a rule set.
    ///
    /// Every extension must be claimed by exactly one rule; a duplicate
    /// claim is a configuration error naming both rules.
    pub fn new(rules: Vec<Rule>) -> Result<Self, Error> {
        let mut rules = rules;
        for rule in &mut rules {
            if rule.extensions.is_empty() {
                bail!("config key 'rules': a rule with no extensions matches nothing");
            }
            if rule.stages.is_empty() {
                bail!("config key 'rules': a rule with no stages is useless");
            }
            for ext in &mut rule.extensions {
                *ext = ext.trim_start_matches('.').to_ascii_lowercase();
                if ext.is_empty() {
                    bail!("config key 'rules': empty file extension");
                }
            }
        }
        for (i, rule) in rules.iter().enumerate() {
            for (j, other) in rules.iter().enumerate().skip(i + 1) {
                if let Some(ext) = rule.extensions.iter().find(|e| other.extensions.contains(e)) {
                    bail!(
                        "config key 'rules': extension '.{}' is claimed by rule {} and rule {}",
                        ext,
                        i,
                        j
                    );
                }
            }
        }
        Ok(Self { rules })
    }

    /// The default chains, mirroring a conventional web-asset setup.
    ///
    /// Production hardens the chains: strict lint, vendor prefixing on
    /// styles, asset optimization.
    pub fn defaults(mode: Mode) -> Self {
        let strict = mode.is_prod();

        let mut css_stages = vec![Stage::CompileStyles(StyleOptions {
            dialect: StyleDialect::Css,
            ..Default::default()
        })];
        let mut scss_stages = vec![Stage::CompileStyles(StyleOptions {
            dialect: StyleDialect::Sass,
            ..Default::default()
        })];
        if strict {
            css_stages.push(Stage::VendorPrefix(VendorPrefixOptions::default()));
            scss_stages.push(Stage::VendorPrefix(VendorPrefixOptions::default()));
        }

        let rules = vec![
            Rule {
                extensions: vec!["js".to_string(), "mjs".to_string()],
                stages: vec![
                    Stage::Lint(LintOptions {
                        fail_on_warnings: strict,
                    }),
                    Stage::Transpile(TranspileOptions {
                        dialect: ScriptDialect::EcmaScript,
                    }),
                ],
            },
            Rule {
                extensions: vec!["ts".to_string(), "tsx".to_string()],
                stages: vec![
                    Stage::TypeCheck(TypeCheckOptions::default()),
                    Stage::Transpile(TranspileOptions {
                        dialect: ScriptDialect::TypeScript,
                    }),
                ],
            },
            Rule {
                extensions: vec!["css".to_string()],
                stages: css_stages,
            },
            Rule {
                extensions: vec!["scss".to_string()],
                stages: scss_stages,
            },
            Rule {
                extensions: vec![
                    "woff".to_string(),
                    "woff2".to_string(),
                    "eot".to_string(),
                    "ttf".to_string(),
                    "otf".to_string(),
                ],
                stages: vec![Stage::EmitFile(EmitFileOptions::default())],
            },
            Rule {
                extensions: vec![
                    "png".to_string(),
                    "jpg".to_string(),
                    "jpeg".to_string(),
                    "gif".to_string(),
                    "svg".to_string(),
                ],
                stages: vec![Stage::InlineAssets(AssetOptions {
                    optimize: strict,
                    ..Default::default()
                })],
            },
        ];

        // The defaults are disjoint by construction
        Self::new(rules).expect("default rules are valid")
    }

    /// The single chain matching a path's extension, if any.
    pub fn chain_for(&self, path: &Path) -> Option<&Rule> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        self.rules
            .iter()
            .find(|rule| rule.extensions.iter().any(|e| *e == ext))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}
