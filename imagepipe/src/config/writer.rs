//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;
use super::size::format_size;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let kinds = config
        .debug
        .kinds
        .iter()
        .map(|(needle, kind)| format!("{}:{}", needle, kind))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[pipeline]
; Number of loads allowed to run at the same time
max_concurrent_loads = {}
; Read size for local files (e.g., 64KB)
chunk_size = {}

[cache]
; Memory cache limit for decoded images (e.g., 256MB, 1GB)
memory_limit = {}
; Maximum number of cached images (0 = unlimited)
count_limit = {}
; Largest single image, as a percentage of memory_limit
entry_cost_limit = {}%
; Disk cache directory shown by 'imagepipe inspect'
directory = {}

[http]
; Request timeout in seconds
timeout = {}
user_agent = {}

[logging]
directory = {}
file = {}

[debug]
; Kind rules for inspection output as 'needle:kind' pairs, first match wins
; Leave empty for the built-in rules
kinds = {}
"#,
        config.pipeline.max_concurrent_loads,
        format_size(config.pipeline.chunk_size),
        format_size(config.cache.memory_limit),
        config.cache.count_limit.unwrap_or(0),
        config.cache.entry_cost_percent,
        path_to_string(&config.cache.directory),
        config.http.timeout_secs,
        config.http.user_agent,
        path_to_string(&config.logging.directory),
        config.logging.file,
        kinds,
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
