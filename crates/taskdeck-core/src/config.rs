use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

pub const DEFAULT_API_URL: &str = "https://hamza1222-todo.hf.space";

#[derive(Debug, Clone)]
pub struct Config {
    map: HashMap<String, String>,
    pub loaded_files: Vec<PathBuf>,
}

impl Config {
    #[tracing::instrument(skip(rc_override))]
    pub fn load(rc_override: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config {
            map: HashMap::new(),
            loaded_files: vec![],
        };

        cfg.map
            .insert("api.url".to_string(), DEFAULT_API_URL.to_string());
        cfg.map
            .insert("default.command".to_string(), "list".to_string());
        cfg.map.insert("color".to_string(), "on".to_string());
        cfg.map
            .insert("confirmation".to_string(), "on".to_string());

        let rc_path = resolve_rc_path(rc_override)?;
        if let Some(path) = rc_path {
            info!(rc = %path.display(), "loading taskdeckrc");
            cfg.load_file(&path)?;
        } else {
            warn!("no taskdeckrc found; using defaults");
        }

        Ok(cfg)
    }

    #[tracing::instrument(skip(self, overrides))]
    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (k, v) in overrides {
            let key = k.strip_prefix("rc.").unwrap_or(&k).to_string();
            debug!(key = %key, value = %v, "applying override");
            self.map.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.map.get(key).map(|v| parse_bool(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    #[tracing::instrument(skip(self))]
    fn load_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let path = expand_tilde(path);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        self.loaded_files.push(path.clone());

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        for (line_num, raw_line) in text.lines().enumerate() {
            let mut line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((before, _)) = line.split_once('#') {
                line = before.trim();
            }

            if line.is_empty() {
                continue;
            }

            if let Some(include_rest) = line.strip_prefix("include ") {
                let include_path = resolve_include_path(&base_dir, include_rest.trim())?;
                debug!(
                    file = %path.display(),
                    include = %include_path.display(),
                    line = line_num + 1,
                    "processing include"
                );

                if include_path.exists() {
                    self.load_file(&include_path)?;
                } else {
                    warn!(include = %include_path.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let (k, v) = line.split_once('=').ok_or_else(|| {
                anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    line_num + 1,
                    raw_line
                )
            })?;

            let key = k.trim().to_string();
            let value = v.trim().to_string();
            trace!(key = %key, value = %value, "loaded config key");
            self.map.insert(key, value);
        }

        Ok(())
    }
}

#[tracing::instrument(skip(cfg))]
pub fn resolve_api_base(cfg: &Config) -> String {
    let raw = std::env::var("TASKDECK_API_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| cfg.get("api.url"))
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    let base = normalize_api_base(&raw);
    info!(base = %base, "resolved API base URL");
    base
}

pub fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Some(stripped) = base.strip_suffix("/api") {
        base = stripped.trim_end_matches('/').to_string();
    }
    base
}

#[tracing::instrument(skip(cfg, override_dir))]
pub fn resolve_data_dir(cfg: &Config, override_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(path) = override_dir {
        path.to_path_buf()
    } else if let Some(cfg_value) = cfg.get("data.location") {
        expand_tilde(Path::new(&cfg_value))
    } else {
        default_data_dir()?
    };

    if !dir.exists() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    Ok(dir)
}

#[tracing::instrument(skip(override_path))]
fn resolve_rc_path(override_path: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = override_path {
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(rc_env) = std::env::var("TASKDECKRC") {
        if rc_env == "/dev/null" {
            return Ok(None);
        }
        return Ok(Some(PathBuf::from(rc_env)));
    }

    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    let candidate = home.join(".taskdeckrc");
    if candidate.exists() {
        return Ok(Some(candidate));
    }

    Ok(None)
}

fn default_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(home.join(".taskdeck"))
}

fn resolve_include_path(base_dir: &Path, include: &str) -> anyhow::Result<PathBuf> {
    if include.trim().is_empty() {
        return Err(anyhow!("include path cannot be empty"));
    }

    let raw = PathBuf::from(include);
    let expanded = expand_tilde(&raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if let Some(rest) = text.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "on" | "true"
    )
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{Config, normalize_api_base, resolve_data_dir};

    #[test]
    fn api_suffix_is_stripped() {
        assert_eq!(normalize_api_base("https://x.test/api"), "https://x.test");
        assert_eq!(normalize_api_base("https://x.test/api/"), "https://x.test");
        assert_eq!(
            normalize_api_base("https://x.test/service/api"),
            "https://x.test/service"
        );
    }

    #[test]
    fn plain_base_is_untouched_except_trailing_slash() {
        assert_eq!(normalize_api_base("https://x.test"), "https://x.test");
        assert_eq!(normalize_api_base("https://x.test/"), "https://x.test");
        assert_eq!(
            normalize_api_base("https://x.test/apiary"),
            "https://x.test/apiary"
        );
    }

    #[test]
    fn rc_file_overrides_defaults() {
        let mut rc = tempfile::NamedTempFile::new().unwrap();
        writeln!(rc, "# taskdeck settings").unwrap();
        writeln!(rc, "api.url = https://todo.example/api").unwrap();
        writeln!(rc, "color = off").unwrap();
        rc.flush().unwrap();

        let cfg = Config::load(Some(rc.path())).unwrap();
        assert_eq!(
            cfg.get("api.url").as_deref(),
            Some("https://todo.example/api")
        );
        assert_eq!(cfg.get_bool("color"), Some(false));
        assert_eq!(cfg.get("default.command").as_deref(), Some("list"));
    }

    #[test]
    fn overrides_strip_rc_prefix() {
        let mut cfg = Config::load(Some(std::path::Path::new("/dev/null"))).unwrap();
        cfg.apply_overrides(vec![(
            "rc.api.url".to_string(),
            "https://other.example".to_string(),
        )]);
        assert_eq!(
            cfg.get("api.url").as_deref(),
            Some("https://other.example")
        );
    }

    #[test]
    fn data_dir_is_created_on_demand() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("deck");
        let cfg = Config::load(Some(std::path::Path::new("/dev/null"))).unwrap();

        let resolved = resolve_data_dir(&cfg, Some(&target)).unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }
}
