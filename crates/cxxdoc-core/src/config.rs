//! Project configuration (`cxxdoc.toml`) parsing and validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::lexer::Language;

/// File name looked up when no explicit config path is given.
pub const CONFIG_FILE_NAME: &str = "cxxdoc.toml";

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown language '{0}', expected e.g. c, c++17, c++20")]
    UnknownLanguage(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// The complete cxxdoc.toml configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Treat warnings as errors at the end of the run.
    #[serde(default)]
    pub strict: bool,

    /// Worker pool size (None = one per core).
    #[serde(default)]
    pub threads: Option<usize>,

    /// Language revision used to classify code, e.g. "c++20".
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub sources: Sources,

    /// External reference indexes.
    #[serde(default)]
    pub tagfiles: Vec<TagfileSpec>,

    #[serde(default)]
    pub code: CodeSettings,

    #[serde(default)]
    pub toc: TocSettings,

    /// Plain-text terms that should link somewhere.
    #[serde(default)]
    pub autolinks: BTreeMap<String, String>,

    /// Emoji names to code points, used by the `[emoji x]` shorthand.
    #[serde(default)]
    pub emoji: BTreeMap<String, u32>,

    #[serde(default)]
    pub versions: VersionSettings,
}

/// Where the extractor output lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Sources {
    #[serde(default = "default_xml_dir")]
    pub xml_dir: PathBuf,

    #[serde(default = "default_html_dir")]
    pub html_dir: PathBuf,

    /// Leading path segments removed from displayed `#include` lines.
    #[serde(default)]
    pub strip_includes: Vec<String>,
}

/// A tagfile and the base URL its files are published under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TagfileSpec {
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CodeSettings {
    /// Classes marking `pre`/`code` elements as code regions.
    #[serde(default = "default_region_classes")]
    pub region_classes: Vec<String>,

    /// Classes marking member detail blocks whose heading is a signature.
    #[serde(default = "default_details_classes")]
    pub details_classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TocSettings {
    #[serde(default = "default_min_level")]
    pub min_level: u8,

    #[serde(default = "default_max_level")]
    pub max_level: u8,

    /// Heading count at which a missing table of contents is synthesized.
    #[serde(default = "default_min_headings")]
    pub min_headings: usize,

    /// Headings carrying this class are left out.
    #[serde(default = "default_exclude_class")]
    pub exclude_class: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VersionSettings {
    /// Either a version floor ("1.3.0") or a negative keep-last-N count.
    #[serde(default)]
    pub min_version: Option<MinVersionSetting>,

    /// Keep only the highest patch of each major.minor.
    #[serde(default = "default_true")]
    pub squash_patches: bool,

    /// Branch to build in addition to tags.
    #[serde(default)]
    pub head: Option<String>,

    /// Command run inside each checkout before the pipeline.
    #[serde(default)]
    pub prepare: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MinVersionSetting {
    Version(String),
    Count(i64),
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    String::from("c++20")
}

fn default_xml_dir() -> PathBuf {
    PathBuf::from("xml")
}

fn default_html_dir() -> PathBuf {
    PathBuf::from("html")
}

fn default_region_classes() -> Vec<String> {
    vec![String::from("m-code")]
}

fn default_details_classes() -> Vec<String> {
    vec![String::from("m-doc-details")]
}

fn default_min_level() -> u8 {
    2
}

fn default_max_level() -> u8 {
    3
}

fn default_min_headings() -> usize {
    3
}

fn default_exclude_class() -> String {
    String::from("no-toc")
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            xml_dir: default_xml_dir(),
            html_dir: default_html_dir(),
            strip_includes: Vec::new(),
        }
    }
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            region_classes: default_region_classes(),
            details_classes: default_details_classes(),
        }
    }
}

impl Default for TocSettings {
    fn default() -> Self {
        Self {
            min_level: default_min_level(),
            max_level: default_max_level(),
            min_headings: default_min_headings(),
            exclude_class: default_exclude_class(),
        }
    }
}

impl Default for VersionSettings {
    fn default() -> Self {
        Self {
            min_version: None,
            squash_patches: true,
            head: None,
            prepare: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict: false,
            threads: None,
            language: default_language(),
            sources: Sources::default(),
            tagfiles: Vec::new(),
            code: CodeSettings::default(),
            toc: TocSettings::default(),
            autolinks: BTreeMap::new(),
            emoji: BTreeMap::new(),
            versions: VersionSettings::default(),
        }
    }
}

impl Config {
    /// Load a configuration file, resolving relative paths against its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config = Self::parse(&content)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Parse a configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.language()?;

        if self.threads == Some(0) {
            return Err(ConfigError::Invalid {
                field: "threads",
                reason: String::from("must be at least 1"),
            });
        }

        if self.code.region_classes.is_empty() {
            return Err(ConfigError::Invalid {
                field: "code.region_classes",
                reason: String::from("at least one class is required"),
            });
        }

        let toc = &self.toc;
        if !(1..=6).contains(&toc.min_level)
            || !(1..=6).contains(&toc.max_level)
            || toc.min_level > toc.max_level
        {
            return Err(ConfigError::Invalid {
                field: "toc",
                reason: format!(
                    "heading levels {}..{} must lie within 1..6",
                    toc.min_level, toc.max_level
                ),
            });
        }

        if let Some(MinVersionSetting::Count(n)) = self.versions.min_version {
            if n >= 0 {
                return Err(ConfigError::Invalid {
                    field: "versions.min_version",
                    reason: format!("a count must be negative (keep last N), got {n}"),
                });
            }
        }

        Ok(())
    }

    /// Parsed language hint.
    pub fn language(&self) -> Result<Language, ConfigError> {
        self.language
            .parse()
            .map_err(|()| ConfigError::UnknownLanguage(self.language.clone()))
    }

    /// Make relative paths relative to `base` (usually the config file's directory).
    pub fn resolve_paths(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.sources.xml_dir);
        rebase(&mut self.sources.html_dir);
        for tagfile in &mut self.tagfiles {
            rebase(&mut tagfile.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Standard;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.language().unwrap(), Language::Cpp(Standard::Cpp20));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
strict = true
threads = 4
language = "c++17"

[sources]
xml_dir = "build/xml"
html_dir = "build/html"
strip_includes = ["include/"]

[[tagfiles]]
path = "cppreference.tag.xml"
url = "https://en.cppreference.com/w/"

[toc]
max_level = 4

[autolinks]
"std::vector" = "https://en.cppreference.com/w/cpp/container/vector"

[versions]
min_version = -3
squash_patches = false
head = "main"
"#;
        let config = Config::parse(toml).unwrap();
        assert!(config.strict);
        assert_eq!(config.threads, Some(4));
        assert_eq!(config.tagfiles.len(), 1);
        assert_eq!(config.toc.max_level, 4);
        assert_eq!(config.toc.min_level, 2);
        assert_eq!(config.versions.min_version, Some(MinVersionSetting::Count(-3)));
        assert!(!config.versions.squash_patches);
        assert_eq!(config.sources.strip_includes, vec!["include/"]);
    }

    #[test]
    fn test_min_version_string() {
        let config = Config::parse("[versions]\nmin_version = \"1.3.0\"\n").unwrap();
        assert_eq!(
            config.versions.min_version,
            Some(MinVersionSetting::Version(String::from("1.3.0")))
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        assert!(matches!(
            Config::parse("bogus = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::parse("threads = 0"),
            Err(ConfigError::Invalid { field: "threads", .. })
        ));
        assert!(matches!(
            Config::parse("language = \"cobol\""),
            Err(ConfigError::UnknownLanguage(_))
        ));
        assert!(Config::parse("[toc]\nmin_level = 4\nmax_level = 2\n").is_err());
        assert!(Config::parse("[versions]\nmin_version = 2\n").is_err());
    }

    #[test]
    fn test_resolve_paths() {
        let mut config = Config::default();
        config.tagfiles.push(TagfileSpec {
            path: PathBuf::from("std.tag"),
            url: String::from("https://example.com/"),
        });
        config.resolve_paths(Path::new("/proj"));
        assert_eq!(config.sources.xml_dir, PathBuf::from("/proj/xml"));
        assert_eq!(config.tagfiles[0].path, PathBuf::from("/proj/std.tag"));
    }
}
