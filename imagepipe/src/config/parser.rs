//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use super::size::parse_size;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn positive<T>(section: &str, key: &str, value: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + Default + PartialEq,
{
    value
        .trim()
        .parse::<T>()
        .ok()
        .filter(|v| *v != T::default())
        .ok_or_else(|| invalid(section, key, value, "must be a positive integer"))
}

fn size(section: &str, key: &str, value: &str) -> Result<usize, ConfigFileError> {
    parse_size(value)
        .map_err(|_| invalid(section, key, value, "expected format like '256MB', '64KB', or '1024'"))
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [pipeline] section
    if let Some(section) = ini.section(Some("pipeline")) {
        if let Some(v) = section.get("max_concurrent_loads") {
            config.pipeline.max_concurrent_loads = positive("pipeline", "max_concurrent_loads", v)?;
        }
        if let Some(v) = section.get("chunk_size") {
            let parsed = size("pipeline", "chunk_size", v)?;
            if parsed == 0 {
                return Err(invalid("pipeline", "chunk_size", v, "must be greater than zero"));
            }
            config.pipeline.chunk_size = parsed;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("memory_limit") {
            config.cache.memory_limit = size("cache", "memory_limit", v)?;
        }
        if let Some(v) = section.get("count_limit") {
            let parsed: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("cache", "count_limit", v, "must be an integer (0 = unlimited)"))?;
            config.cache.count_limit = (parsed > 0).then_some(parsed);
        }
        if let Some(v) = section.get("entry_cost_limit") {
            let percent = v.trim().trim_end_matches('%').trim();
            config.cache.entry_cost_percent = percent
                .parse::<u8>()
                .ok()
                .filter(|p| (1..=100).contains(p))
                .ok_or_else(|| {
                    invalid("cache", "entry_cost_limit", v, "must be a percentage between 1 and 100")
                })?;
        }
        if let Some(v) = non_empty(section, "directory") {
            config.cache.directory = expand_tilde(v);
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = section.get("timeout") {
            config.http.timeout_secs = positive::<u64>("http", "timeout", v)?;
        }
        if let Some(v) = non_empty(section, "user_agent") {
            config.http.user_agent = v.to_string();
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = non_empty(section, "directory") {
            config.logging.directory = expand_tilde(v);
        }
        if let Some(v) = non_empty(section, "file") {
            config.logging.file = v.to_string();
        }
    }

    // [debug] section
    if let Some(section) = ini.section(Some("debug")) {
        if let Some(v) = section.get("kinds") {
            config.debug.kinds = parse_kinds(v)?;
        }
    }

    Ok(config)
}

/// Parses `needle:kind` pairs separated by commas.
fn parse_kinds(value: &str) -> Result<Vec<(String, String)>, ConfigFileError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| match rule.split_once(':') {
            Some((needle, kind)) if !needle.trim().is_empty() && !kind.trim().is_empty() => {
                Ok((needle.trim().to_string(), kind.trim().to_string()))
            }
            _ => Err(invalid(
                "debug",
                "kinds",
                value,
                "expected comma-separated 'needle:kind' pairs",
            )),
        })
        .collect()
}

/// Expand `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_invalid_memory_limit() {
        let err = load(
            r#"
[cache]
memory_limit = 2TB
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("memory_limit"));
    }

    #[test]
    fn test_human_readable_sizes() {
        let config = load(
            r#"
[pipeline]
chunk_size = 16KB

[cache]
memory_limit = 512MB
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.chunk_size, 16 * 1024);
        assert_eq!(config.cache.memory_limit, 512 * 1024 * 1024);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = load(
            r#"
[pipeline]
max_concurrent_loads = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("positive integer"));
    }

    #[test]
    fn test_zero_http_timeout_rejected() {
        let err = load("[http]\ntimeout = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains("positive integer"));

        let config = load("[http]\ntimeout = 5\n").unwrap();
        assert_eq!(config.http.timeout_secs, 5);
    }

    #[test]
    fn test_count_limit_zero_is_unlimited() {
        let config = load("[cache]\ncount_limit = 0\n").unwrap();
        assert_eq!(config.cache.count_limit, None);

        let config = load("[cache]\ncount_limit = 50\n").unwrap();
        assert_eq!(config.cache.count_limit, Some(50));
    }

    #[test]
    fn test_entry_cost_limit_percentage() {
        let config = load("[cache]\nentry_cost_limit = 25%\n").unwrap();
        assert_eq!(config.cache.entry_cost_percent, 25);

        assert!(load("[cache]\nentry_cost_limit = 0\n").is_err());
        assert!(load("[cache]\nentry_cost_limit = 150\n").is_err());
    }

    #[test]
    fn test_debug_kinds() {
        let config = load("[debug]\nkinds = thumb:thumbnail, /hero/ : banner\n").unwrap();
        assert_eq!(
            config.debug.kinds,
            vec![
                ("thumb".to_string(), "thumbnail".to_string()),
                ("/hero/".to_string(), "banner".to_string()),
            ]
        );

        assert!(load("[debug]\nkinds = nocolon\n").is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/test/path");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path, home.join("test/path"));
        }

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_partial_config() {
        let config = load(
            r#"
[http]
timeout = 5
"#,
        )
        .unwrap();

        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.http.user_agent, crate::loader::DEFAULT_USER_AGENT);
        assert_eq!(config.cache.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert_eq!(config.pipeline, ConfigFile::default().pipeline);
    }
}
