//! Default values for every configuration setting.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::cache::DEFAULT_COST_LIMIT;
use crate::loader::{DEFAULT_CHUNK_SIZE, DEFAULT_USER_AGENT};
use crate::logging::DEFAULT_LOG_FILE;
use crate::pipeline::DEFAULT_MAX_CONCURRENT_LOADS;

/// Default memory cache limit (256 MB of decoded pixels).
pub const DEFAULT_MEMORY_LIMIT: usize = DEFAULT_COST_LIMIT;

/// Default per-entry cost limit, as a percentage of the memory limit.
pub const DEFAULT_ENTRY_COST_PERCENT: u8 = 10;

/// Default HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default disk cache directory (`<platform cache dir>/imagepipe`).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| config_directory().join("cache"))
        .join("imagepipe")
}

/// Default log directory (`~/.imagepipe/logs`).
pub fn default_log_directory() -> PathBuf {
    config_directory().join("logs")
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            pipeline: PipelineSettings {
                max_concurrent_loads: DEFAULT_MAX_CONCURRENT_LOADS,
                chunk_size: DEFAULT_CHUNK_SIZE,
            },
            cache: CacheSettings {
                memory_limit: DEFAULT_MEMORY_LIMIT,
                count_limit: None,
                entry_cost_percent: DEFAULT_ENTRY_COST_PERCENT,
                directory: default_cache_directory(),
            },
            http: HttpSettings {
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT.to_string(),
            },
            logging: LoggingSettings {
                directory: default_log_directory(),
                file: DEFAULT_LOG_FILE.to_string(),
            },
            debug: DebugSettings { kinds: Vec::new() },
        }
    }
}
