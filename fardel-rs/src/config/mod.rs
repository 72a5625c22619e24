//! Typed build configuration.
//!
//! A project file (`fardel.json`) deserializes into [`RawConfig`], a thin
//! serde mirror with defaults. [`Config::resolve`] is a pure function from
//! a raw configuration plus a [`Mode`] to an immutable, fully-materialized
//! [`Config`]: every mode-dependent value (filename templates, public path,
//! source maps, the minify/manifest/clean toggles) is decided there, and
//! everything the engine would otherwise trip over mid-build is validated
//! there with the offending key named.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Error};
use serde::{Deserialize, Serialize};

use crate::devserver::{default_headers, DevServerConfig, ProxyRule};
use crate::emit::template::FilenameTemplate;
use crate::pipeline::{Rule, RuleSet};
use crate::text;

/// Environment variable consulted by [`Mode::from_env`].
pub const MODE_ENV_VAR: &str = "FARDEL_ENV";

/// The process-wide build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    /// Reads the mode from `FARDEL_ENV`; anything but `dev`/`development`
    /// means a production build.
    pub fn from_env() -> Self {
        match std::env::var(MODE_ENV_VAR).as_deref() {
            Ok("dev") | Ok("development") => Self::Development,
            _ => Self::Production,
        }
    }

    pub fn is_dev(self) -> bool {
        self == Self::Development
    }

    pub fn is_prod(self) -> bool {
        self == Self::Production
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" | "development" => Ok(Self::Development),
            "prod" | "production" => Ok(Self::Production),
            other => bail!("unknown mode '{}', expected 'dev' or 'prod'", other),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Development => "development",
            Self::Production => "production",
        })
    }
}

/// Source-map behavior per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    /// Fast, sources-only maps for development.
    Cheap,
    Off,
}

/// Serde mirror of a `fardel.json` project file.
///
/// Unknown keys are rejected at parse time so a typo fails the build with
/// the key named rather than being silently ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    /// Bundle name to ordered entry-module paths.
    pub entry: BTreeMap<String, Vec<String>>,
    pub output: RawOutput,
    pub resolve: RawResolve,
    pub dev_server: RawDevServer,
    /// Explicit transform chains; empty means the built-in defaults.
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawOutput {
    /// Output directory, relative to the project root.
    pub path: Option<String>,
    /// Script bundle filename template; defaults per mode.
    pub filename: Option<String>,
    /// Extracted style bundle filename template; defaults per mode.
    pub css_filename: Option<String>,
    /// Public URL prefix under which emitted assets are served.
    pub public_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawResolve {
    /// Alias name to project-root-relative directory.
    pub alias: BTreeMap<String, String>,
    /// Extension probing order, with dots; defaults to `.tsx`, `.ts`, `.js`.
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawDevServer {
    /// Origin the dev server is reachable at; prefixes the dev public path.
    pub origin: Option<String>,
    /// Show build errors as a page overlay.
    pub overlay: bool,
    /// Static content directory, relative to the project root.
    pub content_base: Option<String>,
    /// Extra response headers; empty means the permissive CORS defaults.
    pub headers: BTreeMap<String, String>,
    pub proxy: Vec<RawProxyRule>,
}

impl Default for RawDevServer {
    fn default() -> Self {
        Self {
            origin: None,
            overlay: true,
            content_base: None,
            headers: BTreeMap::new(),
            proxy: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProxyRule {
    /// URL path prefix to intercept, e.g. `/web`.
    pub prefix: String,
    /// Upstream origin requests are forwarded to.
    pub target: String,
}

impl RawConfig {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        serde_json::from_str(text::strip_bom(json))
            .map_err(|err| anyhow::anyhow!("malformed configuration: {}", err))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration '{}'", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("in configuration file '{}'", path.display()))
    }
}

/// Resolved output settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub filename: FilenameTemplate,
    pub css_filename: FilenameTemplate,
    pub public_path: String,
}

/// Resolved alias and extension-probing settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveConfig {
    pub alias: BTreeMap<String, PathBuf>,
    pub extensions: Vec<String>,
}

/// An immutable, fully-resolved build configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub mode: Mode,
    /// Project root all relative paths are anchored at.
    pub root: PathBuf,
    pub entry: BTreeMap<String, Vec<PathBuf>>,
    pub output: OutputConfig,
    pub resolve: ResolveConfig,
    pub dev_server: DevServerConfig,
    pub rules: RuleSet,
    pub source_map: SourceMapMode,
    pub watch: bool,
    pub minify: bool,
    pub emit_manifest: bool,
    pub clean_output_dir: bool,
}

impl Config {
    /// Resolves a raw configuration for one mode.
    ///
    /// Pure: no environment reads, no filesystem, no mutation of shared
    /// state. Calling it twice with equal inputs yields equal values.
    pub fn resolve(raw: &RawConfig, mode: Mode, root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();

        if raw.entry.is_empty() {
            bail!("config key 'entry': at least one bundle entry is required");
        }
        let mut entry = BTreeMap::new();
        for (bundle, modules) in &raw.entry {
            if bundle.is_empty() {
                bail!("config key 'entry': bundle name must not be empty");
            }
            if modules.is_empty() {
                bail!("config key 'entry.{}': module list is empty", bundle);
            }
            entry.insert(
                bundle.clone(),
                modules.iter().map(PathBuf::from).collect::<Vec<_>>(),
            );
        }

        let output = Self::resolve_output(&raw.output, &raw.dev_server, mode)?;
        let resolve = Self::resolve_resolve(&raw.resolve)?;
        let dev_server = Self::resolve_dev_server(&raw.dev_server)?;

        let rules = if raw.rules.is_empty() {
            RuleSet::defaults(mode)
        } else {
            RuleSet::new(raw.rules.clone())?
        };

        Ok(Self {
            mode,
            root,
            entry,
            output,
            resolve,
            dev_server,
            rules,
            source_map: if mode.is_dev() {
                SourceMapMode::Cheap
            } else {
                SourceMapMode::Off
            },
            watch: mode.is_dev(),
            minify: mode.is_prod(),
            emit_manifest: mode.is_prod(),
            clean_output_dir: mode.is_prod(),
        })
    }

    fn resolve_output(
        raw: &RawOutput,
        dev_server: &RawDevServer,
        mode: Mode,
    ) -> Result<OutputConfig, Error> {
        let filename = Self::resolve_template(
            "output.filename",
            raw.filename.as_deref(),
            mode,
            "[name].js",
            "[name].[chunkhash:8].js",
        )?;
        let css_filename = Self::resolve_template(
            "output.css_filename",
            raw.css_filename.as_deref(),
            mode,
            "[name].css",
            "[name].[contenthash:8].css",
        )?;

        let base = raw.public_path.as_deref().unwrap_or("/assets/");
        if !base.starts_with('/') || !base.ends_with('/') {
            bail!(
                "config key 'output.public_path': '{}' must start and end with '/'",
                base
            );
        }
        let public_path = if mode.is_dev() {
            let origin = dev_server.origin.as_deref().unwrap_or("http://localhost:8080");
            format!("{}{}", origin.trim_end_matches('/'), base)
        } else {
            base.to_string()
        };

        Ok(OutputConfig {
            path: PathBuf::from(raw.path.as_deref().unwrap_or("public/assets")),
            filename,
            css_filename,
            public_path,
        })
    }

    fn resolve_template(
        key: &str,
        raw: Option<&str>,
        mode: Mode,
        dev_default: &str,
        prod_default: &str,
    ) -> Result<FilenameTemplate, Error> {
        let raw = raw.unwrap_or(if mode.is_dev() { dev_default } else { prod_default });
        let template = FilenameTemplate::parse(raw)
            .with_context(|| format!("config key '{}'", key))?;
        if !template.has_placeholder(crate::emit::template::Placeholder::Name) {
            bail!("config key '{}': template '{}' must contain [name]", key, raw);
        }
        if mode.is_dev() && template.has_hash() {
            bail!(
                "config key '{}': template '{}' hashes filenames, which defeats stable \
                 development asset names",
                key,
                raw
            );
        }
        if mode.is_prod() && !template.has_hash() {
            bail!(
                "config key '{}': template '{}' needs a hash placeholder so production \
                 assets are cache-busted",
                key,
                raw
            );
        }
        Ok(template)
    }

    fn resolve_resolve(raw: &RawResolve) -> Result<ResolveConfig, Error> {
        let mut alias = BTreeMap::new();
        for (name, dir) in &raw.alias {
            if name.is_empty() {
                bail!("config key 'resolve.alias': alias name must not be empty");
            }
            if name.contains('/') {
                bail!(
                    "config key 'resolve.alias': alias '{}' must not contain '/'",
                    name
                );
            }
            let dir = dir.trim_start_matches("./");
            alias.insert(name.clone(), PathBuf::from(dir));
        }

        let extensions = if raw.extensions.is_empty() {
            vec![".tsx".to_string(), ".ts".to_string(), ".js".to_string()]
        } else {
            for ext in &raw.extensions {
                if !ext.starts_with('.') || ext.len() < 2 {
                    bail!(
                        "config key 'resolve.extensions': '{}' must start with '.'",
                        ext
                    );
                }
            }
            raw.extensions.clone()
        };

        Ok(ResolveConfig { alias, extensions })
    }

    fn resolve_dev_server(raw: &RawDevServer) -> Result<DevServerConfig, Error> {
        let mut proxy = Vec::new();
        for rule in &raw.proxy {
            proxy.push(
                ProxyRule::new(&rule.prefix, &rule.target)
                    .context("config key 'dev_server.proxy'")?,
            );
        }
        let headers = if raw.headers.is_empty() {
            default_headers()
        } else {
            raw.headers.clone()
        };
        Ok(DevServerConfig {
            origin: raw
                .origin
                .clone()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            overlay: raw.overlay,
            content_base: PathBuf::from(raw.content_base.as_deref().unwrap_or("public")),
            headers,
            proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn raw() -> RawConfig {
        RawConfig::from_json_str(
            r#"{
                "entry": {
                    "app": ["./assets/css/app.scss", "./assets/js/app.ts"]
                },
                "resolve": {
                    "alias": {
                        "@css": "./assets/css",
                        "@": "./assets/js"
                    }
                },
                "dev_server": {
                    "proxy": [
                        {"prefix": "/web", "target": "http://localhost:8000"}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let raw = raw();
        let first = Config::resolve(&raw, Mode::Production, ".").unwrap();
        let second = Config::resolve(&raw, Mode::Production, ".").unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    #[case(Mode::Development, false)]
    #[case(Mode::Production, true)]
    fn test_hashed_filenames_iff_production(#[case] mode: Mode, #[case] hashed: bool) {
        let config = Config::resolve(&raw(), mode, ".").unwrap();
        assert_eq!(config.output.filename.has_hash(), hashed);
        assert_eq!(config.output.css_filename.has_hash(), hashed);
    }

    #[rstest]
    #[case(Mode::Development, false)]
    #[case(Mode::Production, true)]
    fn test_production_toggle_set(#[case] mode: Mode, #[case] enabled: bool) {
        let config = Config::resolve(&raw(), mode, ".").unwrap();
        assert_eq!(config.minify, enabled);
        assert_eq!(config.emit_manifest, enabled);
        assert_eq!(config.clean_output_dir, enabled);
        // watch and cheap source maps are the development half
        assert_eq!(config.watch, !enabled);
        assert_eq!(config.source_map == SourceMapMode::Cheap, !enabled);
    }

    #[test]
    fn test_dev_public_path_carries_origin() {
        let dev = Config::resolve(&raw(), Mode::Development, ".").unwrap();
        assert_eq!(dev.output.public_path, "http://localhost:8080/assets/");
        let prod = Config::resolve(&raw(), Mode::Production, ".").unwrap();
        assert_eq!(prod.output.public_path, "/assets/");
    }

    #[test]
    fn test_missing_entry_rejected() {
        let raw = RawConfig::default();
        let err = Config::resolve(&raw, Mode::Development, ".").unwrap_err();
        assert!(err.to_string().contains("'entry'"));
    }

    #[test]
    fn test_empty_entry_list_names_bundle() {
        let mut raw = raw();
        raw.entry.insert("admin".to_string(), Vec::new());
        let err = Config::resolve(&raw, Mode::Development, ".").unwrap_err();
        assert!(err.to_string().contains("'entry.admin'"));
    }

    #[test]
    fn test_hashed_template_rejected_in_dev() {
        let mut raw = raw();
        raw.output.filename = Some("[name].[chunkhash:8].js".to_string());
        let err = Config::resolve(&raw, Mode::Development, ".").unwrap_err();
        assert!(err.to_string().contains("'output.filename'"));
    }

    #[test]
    fn test_unhashed_template_rejected_in_prod() {
        let mut raw = raw();
        raw.output.filename = Some("[name].js".to_string());
        let err = Config::resolve(&raw, Mode::Production, ".").unwrap_err();
        assert!(err.to_string().contains("cache-busted"));
    }

    #[test]
    fn test_unknown_key_fails_fast() {
        let err = RawConfig::from_json_str(r#"{"entry": {}, "outptu": {}}"#).unwrap_err();
        assert!(err.to_string().contains("outptu"));
    }

    #[test]
    fn test_alias_with_slash_rejected() {
        let mut raw = raw();
        raw.resolve
            .alias
            .insert("@bad/alias".to_string(), "assets".to_string());
        let err = Config::resolve(&raw, Mode::Development, ".").unwrap_err();
        assert!(err.to_string().contains("'@bad/alias'"));
    }

    #[test]
    fn test_invalid_proxy_prefix_rejected() {
        let mut raw = raw();
        raw.dev_server.proxy.push(RawProxyRule {
            prefix: "web".to_string(),
            target: "http://localhost:8000".to_string(),
        });
        let err = Config::resolve(&raw, Mode::Development, ".").unwrap_err();
        assert!(format!("{:#}", err).contains("dev_server.proxy"));
    }

    #[test]
    fn test_default_cors_headers_present() {
        let config = Config::resolve(&raw(), Mode::Development, ".").unwrap();
        assert!(config
            .dev_server
            .headers
            .contains_key("Access-Control-Allow-Origin"));
    }

    #[test]
    fn test_explicit_rules_override_defaults() {
        let mut raw = raw();
        raw.rules = serde_json::from_value(serde_json::json!([
            {
                "extensions": ["js"],
                "stages": [{"stage": "transpile"}]
            }
        ]))
        .unwrap();
        let config = Config::resolve(&raw, Mode::Development, ".").unwrap();
        assert!(config.rules.chain_for(Path::new("a.js")).is_some());
        assert!(config.rules.chain_for(Path::new("a.scss")).is_none());
    }
}
