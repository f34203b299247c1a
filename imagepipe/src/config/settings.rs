//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file. The
//! conversion helpers at the bottom turn settings into the runtime
//! configuration of the library components.

use crate::cache::{ImageCache, ImageCacheConfig};
use crate::debug::KindClassifier;
use crate::loader::{DataLoadError, DefaultDataLoader, FileDataLoader, HttpDataLoader};
use crate::pipeline::PipelineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub pipeline: PipelineSettings,
    pub cache: CacheSettings,
    pub http: HttpSettings,
    pub logging: LoggingSettings,
    pub debug: DebugSettings,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Units of work allowed to run at once.
    pub max_concurrent_loads: usize,
    /// Read size for local files, in bytes.
    pub chunk_size: usize,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Memory cache cost limit in bytes
    pub memory_limit: usize,
    /// Maximum number of memory cache entries; `None` is unlimited
    pub count_limit: Option<usize>,
    /// Largest single entry, as a percentage of `memory_limit` (1-100)
    pub entry_cost_percent: u8,
    /// Disk cache directory, used by inspection commands
    pub directory: PathBuf,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

/// `[debug]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSettings {
    /// `(needle, kind)` rules for inspection output; empty uses the built-in rules
    pub kinds: Vec<(String, String)>,
}

impl ConfigFile {
    pub fn image_cache_config(&self) -> ImageCacheConfig {
        ImageCacheConfig::default()
            .with_cost_limit(self.cache.memory_limit)
            .with_count_limit(self.cache.count_limit.unwrap_or(usize::MAX))
            .with_entry_cost_ratio(f64::from(self.cache.entry_cost_percent) / 100.0)
    }

    /// Builds the default file + HTTP loader from these settings.
    pub fn data_loader(&self) -> Result<DefaultDataLoader, DataLoadError> {
        let file = FileDataLoader::new().with_chunk_size(self.pipeline.chunk_size);
        let http = HttpDataLoader::with_settings(
            Duration::from_secs(self.http.timeout_secs),
            &self.http.user_agent,
        )?;
        Ok(DefaultDataLoader::new(file, http))
    }

    /// Builds a complete pipeline configuration from these settings.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, DataLoadError> {
        Ok(PipelineConfig::new(Arc::new(self.data_loader()?))
            .with_image_cache(Arc::new(ImageCache::new(self.image_cache_config())))
            .with_max_concurrent_loads(self.pipeline.max_concurrent_loads))
    }

    pub fn kind_classifier(&self) -> KindClassifier {
        if self.debug.kinds.is_empty() {
            KindClassifier::default()
        } else {
            KindClassifier::new(self.debug.kinds.clone())
        }
    }
}
