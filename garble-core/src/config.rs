//! Build-wide settings shared by every invocation of one build

use crate::Result;
use config as config_rs;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Prefix of the environment variables carrying [`Settings`].
pub const ENV_PREFIX: &str = "GARBLE";

/// Process-wide named settings.
///
/// `garble build` exports these as `GARBLE_*` variables before starting the Go build
/// driver, and each `-toolexec` invocation loads them back, so all invocations of one
/// build agree on the salt and package selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Only rename packages below this import path prefix.
    pub only: Option<String>,
    /// Package prefixes that are always renamed.
    pub include: Vec<String>,
    /// Package prefixes that are never renamed.
    pub exclude: Vec<String>,
    /// Where rewritten units are written for inspection.
    pub code_out_dir: Option<PathBuf>,
    /// Disable the literal obfuscation pass.
    pub skip_strings: bool,
    /// Build salt.
    pub salt: Option<String>,
    /// Directory the build was started from.
    pub dir: Option<PathBuf>,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load settings from an explicit variable map instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let environment = config_rs::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("include")
            .with_list_parse_key("exclude")
            .source(vars);

        let cfg = config_rs::Config::builder()
            .add_source(environment)
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;
        settings.include.retain(|p| !p.is_empty());
        settings.exclude.retain(|p| !p.is_empty());
        settings.only = settings.only.filter(|p| !p.is_empty());
        settings.salt = settings.salt.filter(|s| !s.is_empty());
        Ok(settings)
    }

    /// The variables that reproduce these settings in a child process.
    pub fn to_vars(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        let mut push = |key: &str, value: String| {
            vars.push((format!("{}_{}", ENV_PREFIX, key), value));
        };

        if let Some(only) = &self.only {
            push("ONLY", only.clone());
        }
        if !self.include.is_empty() {
            push("INCLUDE", self.include.join(","));
        }
        if !self.exclude.is_empty() {
            push("EXCLUDE", self.exclude.join(","));
        }
        if let Some(dir) = &self.code_out_dir {
            push("CODE_OUT_DIR", dir.display().to_string());
        }
        if self.skip_strings {
            push("SKIP_STRINGS", "true".to_string());
        }
        if let Some(salt) = &self.salt {
            push("SALT", salt.clone());
        }
        if let Some(dir) = &self.dir {
            push("DIR", dir.display().to_string());
        }
        vars
    }

    /// Export the settings into the current process environment so that child
    /// processes inherit them.
    pub fn to_env(&self) {
        for (key, value) in self.to_vars() {
            env::set_var(key, value);
        }
    }

    /// Whether identifiers declared in `path` must be left alone because the package is
    /// part of the standard library (or treated as such).
    pub fn is_standard_library(&self, path: &str) -> bool {
        if path == "main" {
            // Main packages may not have fully qualified import paths.
            return false;
        }

        let included = longest_prefix(&self.include, path);
        let excluded = longest_prefix(&self.exclude, path);
        match (included, excluded) {
            (Some(inc), Some(exc)) if inc > exc => return false,
            (_, Some(_)) => return true,
            (Some(_), None) => return false,
            (None, None) => {}
        }

        if let Some(only) = &self.only {
            return !path.starts_with(only.as_str());
        }

        !path.contains('.')
    }

    /// Whether a package should be rewritten at all.
    pub fn is_our_code(&self, path: &str) -> bool {
        match &self.only {
            Some(only) => {
                path.starts_with(only.as_str()) || longest_prefix(&self.include, path).is_some()
            }
            None => true,
        }
    }
}

fn longest_prefix(prefixes: &[String], path: &str) -> Option<usize> {
    prefixes
        .iter()
        .filter(|prefix| path.starts_with(prefix.as_str()))
        .map(String::len)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_from_vars() {
        let settings = Settings::from_vars(vars(&[
            ("GARBLE_ONLY", "example.com/app"),
            ("GARBLE_INCLUDE", "example.com/a,example.com/b"),
            ("GARBLE_SKIP_STRINGS", "true"),
            ("GARBLE_SALT", "abc123"),
            ("GARBLE_CODE_OUT_DIR", "/tmp/out"),
        ]))
        .unwrap();

        assert_eq!(settings.only.as_deref(), Some("example.com/app"));
        assert_eq!(settings.include, vec!["example.com/a", "example.com/b"]);
        assert!(settings.exclude.is_empty());
        assert!(settings.skip_strings);
        assert_eq!(settings.salt.as_deref(), Some("abc123"));
        assert_eq!(settings.code_out_dir, Some(PathBuf::from("/tmp/out")));
    }

    #[test]
    fn test_vars_roundtrip() {
        let settings = Settings {
            only: Some("example.com/app".into()),
            include: vec!["example.com/lib".into()],
            exclude: vec!["example.com/app/gen".into(), "example.com/app/asm".into()],
            code_out_dir: Some(PathBuf::from("/tmp/garble")),
            skip_strings: true,
            salt: Some("s4lt".into()),
            dir: Some(PathBuf::from("/src")),
        };

        let loaded = Settings::from_vars(settings.to_vars().into_iter().collect()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_standard_library_heuristic() {
        let settings = Settings::default();
        assert!(settings.is_standard_library("fmt"));
        assert!(settings.is_standard_library("net/http"));
        assert!(!settings.is_standard_library("main"));
        assert!(!settings.is_standard_library("github.com/user/repo"));
    }

    #[test]
    fn test_include_and_exclude() {
        let settings = Settings {
            include: vec!["mycorp".into()],
            exclude: vec!["github.com/vendored".into(), "mycorp/gen".into()],
            ..Settings::default()
        };
        assert!(!settings.is_standard_library("mycorp/service"));
        assert!(settings.is_standard_library("github.com/vendored/x"));
        assert!(settings.is_standard_library("mycorp/gen/proto"));
        assert!(!settings.is_standard_library("github.com/other/y"));
    }

    #[test]
    fn test_only_subtree() {
        let settings = Settings {
            only: Some("example.com/app".into()),
            include: vec!["example.com/shared".into()],
            ..Settings::default()
        };
        assert!(!settings.is_standard_library("example.com/app/internal/db"));
        assert!(settings.is_standard_library("github.com/lib/pq"));
        assert!(!settings.is_standard_library("example.com/shared/log"));
        assert!(!settings.is_standard_library("main"));

        assert!(settings.is_our_code("example.com/app"));
        assert!(settings.is_our_code("example.com/shared"));
        assert!(!settings.is_our_code("github.com/lib/pq"));
        assert!(Settings::default().is_our_code("anything"));
    }
}
