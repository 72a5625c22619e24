//! Import specifier resolution.
//!
//! Turns the specifiers the graph scanner finds into candidate
//! project-root-relative paths: alias substitution first, then relative
//! resolution against the importing module, then extension probing for
//! extensionless specifiers. Candidate generation is pure; the graph
//! builder decides the winner by asking its loader which candidate exists.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Error};

use crate::config::ResolveConfig;

#[derive(Debug, Clone)]
pub struct Resolver {
    /// Alias name to project-root-relative directory, matched longest-first.
    alias: Vec<(String, PathBuf)>,
    /// Extension probing order for extensionless specifiers, with dots.
    extensions: Vec<String>,
}

impl Resolver {
    pub fn new(config: &ResolveConfig) -> Self {
        let mut alias: Vec<(String, PathBuf)> = config
            .alias
            .iter()
            .map(|(name, dir)| (name.clone(), dir.clone()))
            .collect();
        alias.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self {
            alias,
            extensions: config.extensions.clone(),
        }
    }

    /// Candidate paths for a specifier, in probing order.
    ///
    /// `importer` is `None` for entry-point specifiers, which resolve
    /// against the project root. Bare specifiers (package imports) are not
    /// supported and fail here.
    pub fn candidates(
        &self,
        specifier: &str,
        importer: Option<&Path>,
    ) -> Result<Vec<PathBuf>, Error> {
        let base = self.base_path(specifier, importer)?;
        let base = normalize(&base).ok_or_else(|| {
            anyhow::anyhow!("specifier '{}' escapes the project root", specifier)
        })?;

        let mut candidates = vec![base.clone()];
        if base.extension().is_none() {
            for ext in &self.extensions {
                let mut probed = base.as_os_str().to_os_string();
                probed.push(ext);
                candidates.push(PathBuf::from(probed));
            }
        }
        Ok(candidates)
    }

    fn base_path(&self, specifier: &str, importer: Option<&Path>) -> Result<PathBuf, Error> {
        for (name, dir) in &self.alias {
            if specifier == name {
                return Ok(dir.clone());
            }
            if let Some(rest) = specifier.strip_prefix(name.as_str()) {
                if let Some(rest) = rest.strip_prefix('/') {
                    return Ok(dir.join(rest));
                }
            }
        }

        if specifier.starts_with("./") || specifier.starts_with("../") {
            return match importer {
                Some(importer) => {
                    let dir = importer.parent().unwrap_or_else(|| Path::new(""));
                    Ok(dir.join(specifier))
                }
                // Entry points are written relative to the project root
                None => Ok(PathBuf::from(specifier)),
            };
        }

        if let Some(rest) = specifier.strip_prefix('/') {
            return Ok(PathBuf::from(rest));
        }

        match importer {
            Some(importer) => bail!(
                "bare module specifier '{}' is not supported (imported from '{}'); \
                 use a relative path or a configured alias",
                specifier,
                importer.display()
            ),
            None => Ok(PathBuf::from(specifier)),
        }
    }
}

/// Normalizes `.` and `..` components away; `None` if `..` escapes the root.
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn resolver() -> Resolver {
        let mut alias = BTreeMap::new();
        alias.insert("@".to_string(), PathBuf::from("assets/js"));
        alias.insert("@css".to_string(), PathBuf::from("assets/css"));
        Resolver::new(&ResolveConfig {
            alias,
            extensions: vec![".tsx".to_string(), ".ts".to_string(), ".js".to_string()],
        })
    }

    #[test]
    fn test_relative_to_importer() {
        let candidates = resolver()
            .candidates("./util.js", Some(Path::new("assets/js/app.js")))
            .unwrap();
        assert_eq!(candidates, vec![PathBuf::from("assets/js/util.js")]);
    }

    #[test]
    fn test_parent_traversal_normalized() {
        let candidates = resolver()
            .candidates("../css/app.scss", Some(Path::new("assets/js/app.ts")))
            .unwrap();
        assert_eq!(candidates, vec![PathBuf::from("assets/css/app.scss")]);
    }

    #[test]
    fn test_longest_alias_wins() {
        let candidates = resolver().candidates("@css/app.scss", None).unwrap();
        assert_eq!(candidates, vec![PathBuf::from("assets/css/app.scss")]);
    }

    #[test]
    fn test_extensionless_probes_in_order() {
        let candidates = resolver()
            .candidates("@/components/button", None)
            .unwrap();
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("assets/js/components/button"),
                PathBuf::from("assets/js/components/button.tsx"),
                PathBuf::from("assets/js/components/button.ts"),
                PathBuf::from("assets/js/components/button.js"),
            ]
        );
    }

    #[test]
    fn test_bare_specifier_rejected() {
        let err = resolver()
            .candidates("lodash", Some(Path::new("assets/js/app.js")))
            .unwrap_err();
        assert!(err.to_string().contains("bare module specifier"));
    }

    #[test]
    fn test_root_escape_rejected() {
        let err = resolver()
            .candidates("../../outside.js", Some(Path::new("app.js")))
            .unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }
}
