//! Site configuration loaded from `pagetoc.yml`.
//!
//! Every field is optional.  A missing file yields [`SiteConfig::default`];
//! a present but malformed file is an error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::text_walk::DEFAULT_IGNORED_CONTAINERS;

/// File name looked up in the serve root when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "pagetoc.yml";

/// One entry of the site navigation bar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NavItem {
    pub label: String,
    pub href: String,
}

/// A literal text substitution applied during the text walk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Substitution {
    pub find: String,
    /// Markup inserted in place of `find`.
    pub replace: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Site name shown in the header and appended to page titles.
    pub title: Option<String>,
    /// Explicit navigation links.  Empty means "derive from the root".
    pub nav: Vec<NavItem>,
    pub substitutions: Vec<Substitution>,
    /// Container ids the text walk skips.
    pub ignored_containers: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: None,
            nav: Vec::new(),
            substitutions: Vec::new(),
            ignored_containers: DEFAULT_IGNORED_CONTAINERS
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
        }
    }
}

/// Parse a configuration document.
pub fn parse(source: &str) -> Result<SiteConfig, String> {
    if source.trim().is_empty() {
        return Ok(SiteConfig::default());
    }
    serde_yml::from_str(source).map_err(|e| format!("invalid configuration: {e}"))
}

/// Load the configuration file at `path`.
pub fn load(path: &Path) -> Result<SiteConfig, String> {
    let source = fs::read_to_string(path)
        .map_err(|e| format!("cannot read config {}: {}", path.display(), e))?;
    let config = parse(&source).map_err(|e| format!("{}: {}", path.display(), e))?;
    eprintln!(
        "[config] path={} nav={} substitutions={}",
        path.display(),
        config.nav.len(),
        config.substitutions.len()
    );
    Ok(config)
}

/// Load `explicit` if given, else `<root>/pagetoc.yml` if present, else the
/// defaults.
pub fn discover(explicit: Option<&Path>, root: &Path) -> Result<SiteConfig, String> {
    if let Some(path) = explicit {
        return load(path);
    }
    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        load(&candidate)
    } else {
        eprintln!("[config] path=<default>");
        Ok(SiteConfig::default())
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

impl SiteConfig {
    /// Navigation links for pages under `root`.
    ///
    /// Uses the configured `nav` when present.  Otherwise lists the top-level
    /// markdown files of `root`, sorted by file name, each linked at
    /// `/<file name>` and labelled with its stem.
    pub fn nav_items(&self, root: &Path) -> Vec<NavItem> {
        if !self.nav.is_empty() {
            return self.nav.clone();
        }
        let mut files: Vec<PathBuf> = match fs::read_dir(root) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && is_markdown(p))
                .collect(),
            Err(e) => {
                eprintln!("[config] nav-scan root={} error={}", root.display(), e);
                return Vec::new();
            }
        };
        files.sort();
        files
            .iter()
            .filter_map(|p| {
                let name = p.file_name()?.to_str()?;
                let stem = p.file_stem()?.to_str()?;
                Some(NavItem {
                    label: stem.to_owned(),
                    href: format!("/{name}"),
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, SiteConfig::default());
        assert_eq!(config.ignored_containers, vec!["toc", "toc_static"]);
    }

    #[test]
    fn full_config_parses() {
        let src = "\
title: Handbook
nav:
  - label: Home
    href: /README.md
  - label: Guide
    href: /guide.md
substitutions:
  - find: \"(c)\"
    replace: \"&copy;\"
ignored_containers: [toc, sidebar]
";
        let config = parse(src).unwrap();
        assert_eq!(config.title.as_deref(), Some("Handbook"));
        assert_eq!(config.nav.len(), 2);
        assert_eq!(config.nav[1].href, "/guide.md");
        assert_eq!(config.substitutions[0].replace, "&copy;");
        assert_eq!(config.ignored_containers, vec!["toc", "sidebar"]);
    }

    #[test]
    fn partial_config_keeps_default_ignored_containers() {
        let config = parse("title: Notes\n").unwrap();
        assert_eq!(config.ignored_containers, vec!["toc", "toc_static"]);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = parse("colour: red\n").unwrap_err();
        assert!(err.starts_with("invalid configuration"), "{err}");
    }

    #[test]
    fn discover_prefers_root_file_then_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(discover(None, tmp.path()).unwrap(), SiteConfig::default());

        fs::write(tmp.path().join(CONFIG_FILE_NAME), "title: Found\n").unwrap();
        let config = discover(None, tmp.path()).unwrap();
        assert_eq!(config.title.as_deref(), Some("Found"));
    }

    #[test]
    fn discover_explicit_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.yml");
        assert!(discover(Some(&missing), tmp.path()).is_err());
    }

    #[test]
    fn nav_items_derived_from_markdown_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("b.md"), "# B").unwrap();
        fs::write(tmp.path().join("a.md"), "# A").unwrap();
        fs::write(tmp.path().join("image.png"), [0u8; 4]).unwrap();
        fs::create_dir(tmp.path().join("sub.md")).unwrap();

        let items = SiteConfig::default().nav_items(tmp.path());
        let hrefs: Vec<&str> = items.iter().map(|i| i.href.as_str()).collect();
        assert_eq!(hrefs, vec!["/a.md", "/b.md"]);
        assert_eq!(items[0].label, "a");
    }

    #[test]
    fn configured_nav_wins_over_scan() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.md"), "# A").unwrap();
        let config = SiteConfig {
            nav: vec![NavItem {
                label: "Docs".into(),
                href: "/docs/".into(),
            }],
            ..SiteConfig::default()
        };
        assert_eq!(config.nav_items(tmp.path()), config.nav);
    }
}
