// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::schema::BotsFile;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Ordered list of bot-list file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/agentline/bots.yaml"));
    paths.push(PathBuf::from("/etc/agentline/bots.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/agentline/bots.yaml"));
        paths.push(home.join(".config/agentline/bots.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("agentline/bots.yaml"));
        paths.push(cfg.join("agentline/bots.yml"));
    }

    paths.push(PathBuf::from(".agentline/bots.yaml"));
    paths.push(PathBuf::from(".agentline/bots.yml"));
    paths.push(PathBuf::from("bots.yaml"));
    paths.push(PathBuf::from("bots.yml"));

    paths
}

/// Load the bot list by merging all discovered YAML files. `extra` names an
/// explicit path (e.g. a `--config` CLI flag), applied last so it overrides
/// every search-path layer.
pub fn load_bots(extra: Option<&Path>) -> Result<BotsFile, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading bots config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit bots config");
        merge_file(&mut merged, p)?;
    }

    let file: BotsFile = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        BotsFile::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(file)
}

fn merge_file(dst: &mut serde_yaml::Value, path: &Path) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let layer: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    merge_yaml(dst, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_preserves_keys_not_in_src() {
        let mut dst = val("a: 1\nb: 2");
        let src = val("b: 99");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"].as_i64(), Some(1));
        assert_eq!(dst["b"].as_i64(), Some(99));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("webhook:\n  public_url: https://a\n  path_secret: x");
        let src = val("webhook:\n  path_secret: y");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["webhook"]["public_url"].as_str(), Some("https://a"));
        assert_eq!(dst["webhook"]["path_secret"].as_str(), Some("y"));
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load_bots(Some(Path::new("/tmp/agentline_nonexistent_bots_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_with_no_files_returns_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = load_bots(None);
        std::env::set_current_dir(cwd).unwrap();
        assert!(result.unwrap().bots.is_empty());
    }

    #[test]
    fn load_explicit_file_parses_bot_list() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "bots:\n  - bot_id: demo\n    default_agent: claude\n").unwrap();
        let file = load_bots(Some(f.path())).unwrap();
        assert_eq!(file.bots.len(), 1);
        assert_eq!(file.bots[0].bot_id, "demo");
    }
}
