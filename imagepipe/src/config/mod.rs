//! User configuration loaded from `~/.imagepipe/config.ini`.
//!
//! [`ConfigFile`] holds one settings struct per INI section and converts
//! them into the runtime configuration of the library:
//!
//! ```
//! use imagepipe::config::ConfigFile;
//!
//! let config = ConfigFile::default();
//! let cache = config.image_cache_config();
//! assert_eq!(cache.entry_cost_limit(), cache.cost_limit / 10);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod size;
mod writer;

pub use defaults::{
    default_cache_directory, default_log_directory, DEFAULT_ENTRY_COST_PERCENT,
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_MEMORY_LIMIT,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    CacheSettings, ConfigFile, DebugSettings, HttpSettings, LoggingSettings, PipelineSettings,
};
pub use size::{format_size, parse_size, SizeParseError};
