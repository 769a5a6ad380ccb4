//! # Configuration
//!
//! A single [`Config`] value assembled once, at `Db::open`, and threaded
//! through the orchestrator, storage, and transaction set rather than read
//! from ambient global state. Built with [`ConfigBuilder`] so callers only
//! need to override the knobs they care about; [`ConfigBuilder::build`]
//! validates the result.

use mvcc::IsoLevel;
use std::path::PathBuf;
use thiserror::Error;

pub const KB: u64 = 1 << 10;
pub const MB: u64 = 1 << 20;
pub const GB: u64 = 1 << 30;
pub const TB: u64 = 1 << 40;

pub const DEFAULT_LEVELS: usize = 7;
pub const DEFAULT_AMPLIFICATION_RATIO: u32 = 1 << 3;
pub const DEFAULT_MEMTABLE_SIZE_BYTES: u64 = MB;
pub const BLOCK_SIZE: usize = 4096;
pub const DEFAULT_BLOOM_K: usize = 4;
pub const DEFAULT_BLOOM_FALSE_POSITIVE_RATE: f64 = 0.01;
pub const DEFAULT_WAL_SYNC: bool = true;
pub const TRX_TIMEOUT_SECONDS: u64 = 15;

/// Errors raised while validating a [`ConfigBuilder`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("levels must be >= 1, got {0}")]
    InvalidLevels(usize),

    #[error("memtable_size_bytes must be > 0")]
    InvalidMemtableSize,

    #[error("amplification_ratio must be >= 1, got {0}")]
    InvalidAmplificationRatio(u32),

    #[error("block_size must be > 0")]
    InvalidBlockSize,

    #[error("bloom_k must be >= 1, got {0}")]
    InvalidBloomK(usize),

    #[error("bloom_false_positive_rate must be in (0, 1), got {0}")]
    InvalidBloomFalsePositiveRate(f64),

    #[error("trx_timeout_seconds must be > 0")]
    InvalidTrxTimeout,
}

/// Tunable knobs for one `Db` instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub work_dir: PathBuf,
    pub memtable_size_bytes: u64,
    pub levels: usize,
    pub amplification_ratio: u32,
    pub block_size: usize,
    pub bloom_k: usize,
    pub bloom_false_positive_rate: f64,
    pub wal_sync: bool,
    pub trx_timeout_seconds: u64,
    pub default_isolation_level: IsoLevel,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build().expect("default config is valid")
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads overrides from the environment, falling back to defaults for
    /// anything unset or unparsable. Recognized variables:
    ///
    /// ```text
    /// RIPTIDE_WORK_DIR              work directory              (default: ".")
    /// RIPTIDE_MEMTABLE_SIZE_BYTES   memtable flush threshold     (default: 1 MiB)
    /// RIPTIDE_LEVELS                number of SST levels        (default: 7)
    /// RIPTIDE_AMPLIFICATION_RATIO   per-level size multiplier   (default: 8)
    /// RIPTIDE_BLOCK_SIZE            SST data block size         (default: 4096)
    /// RIPTIDE_BLOOM_K               bloom filter hash count     (default: 4)
    /// RIPTIDE_BLOOM_FPR             bloom filter target FPR     (default: 0.01)
    /// RIPTIDE_WAL_SYNC              fsync every WAL append      (default: true)
    /// RIPTIDE_TRX_TIMEOUT_SECONDS   transaction wait timeout    (default: 15)
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::new();

        if let Ok(v) = std::env::var("RIPTIDE_WORK_DIR") {
            builder = builder.work_dir(v);
        }
        if let Some(v) = env_parse::<u64>("RIPTIDE_MEMTABLE_SIZE_BYTES") {
            builder = builder.memtable_size_bytes(v);
        }
        if let Some(v) = env_parse::<usize>("RIPTIDE_LEVELS") {
            builder = builder.levels(v);
        }
        if let Some(v) = env_parse::<u32>("RIPTIDE_AMPLIFICATION_RATIO") {
            builder = builder.amplification_ratio(v);
        }
        if let Some(v) = env_parse::<usize>("RIPTIDE_BLOCK_SIZE") {
            builder = builder.block_size(v);
        }
        if let Some(v) = env_parse::<usize>("RIPTIDE_BLOOM_K") {
            builder = builder.bloom_k(v);
        }
        if let Some(v) = env_parse::<f64>("RIPTIDE_BLOOM_FPR") {
            builder = builder.bloom_false_positive_rate(v);
        }
        if let Some(v) = env_parse::<bool>("RIPTIDE_WAL_SYNC") {
            builder = builder.wal_sync(v);
        }
        if let Some(v) = env_parse::<u64>("RIPTIDE_TRX_TIMEOUT_SECONDS") {
            builder = builder.trx_timeout_seconds(v);
        }

        builder.build()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Builder for [`Config`], validated on [`ConfigBuilder::build`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    work_dir: PathBuf,
    memtable_size_bytes: u64,
    levels: usize,
    amplification_ratio: u32,
    block_size: usize,
    bloom_k: usize,
    bloom_false_positive_rate: f64,
    wal_sync: bool,
    trx_timeout_seconds: u64,
    default_isolation_level: IsoLevel,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        ConfigBuilder {
            work_dir: PathBuf::from("."),
            memtable_size_bytes: DEFAULT_MEMTABLE_SIZE_BYTES,
            levels: DEFAULT_LEVELS,
            amplification_ratio: DEFAULT_AMPLIFICATION_RATIO,
            block_size: BLOCK_SIZE,
            bloom_k: DEFAULT_BLOOM_K,
            bloom_false_positive_rate: DEFAULT_BLOOM_FALSE_POSITIVE_RATE,
            wal_sync: DEFAULT_WAL_SYNC,
            trx_timeout_seconds: TRX_TIMEOUT_SECONDS,
            default_isolation_level: IsoLevel::ReadCommitted,
        }
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn memtable_size_bytes(mut self, size: u64) -> Self {
        self.memtable_size_bytes = size;
        self
    }

    pub fn levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    pub fn amplification_ratio(mut self, ratio: u32) -> Self {
        self.amplification_ratio = ratio;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn bloom_k(mut self, k: usize) -> Self {
        self.bloom_k = k;
        self
    }

    pub fn bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.bloom_false_positive_rate = rate;
        self
    }

    pub fn wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    pub fn trx_timeout_seconds(mut self, seconds: u64) -> Self {
        self.trx_timeout_seconds = seconds;
        self
    }

    pub fn default_isolation_level(mut self, level: IsoLevel) -> Self {
        self.default_isolation_level = level;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        if self.levels < 1 {
            return Err(ConfigError::InvalidLevels(self.levels));
        }
        if self.memtable_size_bytes == 0 {
            return Err(ConfigError::InvalidMemtableSize);
        }
        if self.amplification_ratio < 1 {
            return Err(ConfigError::InvalidAmplificationRatio(self.amplification_ratio));
        }
        if self.block_size == 0 {
            return Err(ConfigError::InvalidBlockSize);
        }
        if self.bloom_k < 1 {
            return Err(ConfigError::InvalidBloomK(self.bloom_k));
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(ConfigError::InvalidBloomFalsePositiveRate(
                self.bloom_false_positive_rate,
            ));
        }
        if self.trx_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTrxTimeout);
        }

        Ok(Config {
            work_dir: self.work_dir,
            memtable_size_bytes: self.memtable_size_bytes,
            levels: self.levels,
            amplification_ratio: self.amplification_ratio,
            block_size: self.block_size,
            bloom_k: self.bloom_k,
            bloom_false_positive_rate: self.bloom_false_positive_rate,
            wal_sync: self.wal_sync,
            trx_timeout_seconds: self.trx_timeout_seconds,
            default_isolation_level: self.default_isolation_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.levels, DEFAULT_LEVELS);
        assert_eq!(cfg.memtable_size_bytes, MB);
        assert_eq!(cfg.bloom_k, DEFAULT_BLOOM_K);
    }

    #[test]
    fn builder_overrides_individual_fields() {
        let cfg = Config::builder()
            .levels(3)
            .memtable_size_bytes(2 * MB)
            .build()
            .unwrap();
        assert_eq!(cfg.levels, 3);
        assert_eq!(cfg.memtable_size_bytes, 2 * MB);
        assert_eq!(cfg.amplification_ratio, DEFAULT_AMPLIFICATION_RATIO);
    }

    #[test]
    fn rejects_zero_levels() {
        let result = Config::builder().levels(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidLevels(0))));
    }

    #[test]
    fn rejects_zero_memtable_size() {
        let result = Config::builder().memtable_size_bytes(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidMemtableSize)));
    }

    #[test]
    fn rejects_bad_bloom_fpr() {
        let result = Config::builder().bloom_false_positive_rate(1.5).build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidBloomFalsePositiveRate(_))
        ));
    }

    #[test]
    fn rejects_zero_trx_timeout() {
        let result = Config::builder().trx_timeout_seconds(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidTrxTimeout)));
    }

    #[test]
    fn unit_constants_compose() {
        assert_eq!(MB, KB * 1024);
        assert_eq!(GB, MB * 1024);
        assert_eq!(TB, GB * 1024);
    }
}
