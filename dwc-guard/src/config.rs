//! Validator configuration.
//!
//! Settings come from code defaults, an optional JSON file and `DWC_GUARD_*`
//! environment variables, applied in that order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::collector::DEFAULT_MAX_NUMBER_OF_SAMPLE;
use crate::error::{ErrorContext, Result, ValidatorError};
use crate::jobserver::{JobServerConfig, DEFAULT_LOOKUP_TIMEOUT};
use crate::logging::{self, LogFormat, DEFAULT_LOG_FILTER};
use crate::pipeline::{PipelineConfig, DEFAULT_FILE_SPLIT_SIZE, DEFAULT_VERBATIM_SAMPLE_SIZE};

/// Prefix of the environment variables read by [`ValidatorConfig::from_env`].
pub const ENV_PREFIX: &str = "DWC_GUARD_";

/// Top-level settings of a validator deployment.
///
/// ```rust
/// use dwc_guard::config::ValidatorConfig;
///
/// let config = ValidatorConfig::default().with_file_split_size(500);
/// assert_eq!(config.pipeline_config().file_split_size, 500);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Directory of the file-backed job storage. In-memory storage when unset.
    pub job_result_storage_dir: Option<PathBuf>,
    pub file_split_size: u64,
    pub max_number_of_sample: usize,
    /// Defaults to the number of CPUs.
    pub max_concurrent_jobs: Option<usize>,
    pub lookup_timeout_ms: u64,
    pub verbatim_sample_size: usize,
    /// `RUST_LOG`-style directives, overridden by `RUST_LOG` itself.
    pub log_filter: String,
    pub log_format: LogFormat,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            job_result_storage_dir: None,
            file_split_size: DEFAULT_FILE_SPLIT_SIZE,
            max_number_of_sample: DEFAULT_MAX_NUMBER_OF_SAMPLE,
            max_concurrent_jobs: None,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT.as_millis() as u64,
            verbatim_sample_size: DEFAULT_VERBATIM_SAMPLE_SIZE,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl ValidatorConfig {
    pub fn with_job_result_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.job_result_storage_dir = Some(dir.into());
        self
    }

    pub fn with_file_split_size(mut self, file_split_size: u64) -> Self {
        self.file_split_size = file_split_size;
        self
    }

    pub fn with_max_number_of_sample(mut self, max_number_of_sample: usize) -> Self {
        self.max_number_of_sample = max_number_of_sample;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max_concurrent_jobs: usize) -> Self {
        self.max_concurrent_jobs = Some(max_concurrent_jobs);
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout_ms = lookup_timeout.as_millis() as u64;
        self
    }

    pub fn with_verbatim_sample_size(mut self, verbatim_sample_size: usize) -> Self {
        self.verbatim_sample_size = verbatim_sample_size;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Reads a JSON configuration file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            ValidatorError::Configuration(format!("{}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `DWC_GUARD_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Applies overrides looked up by unprefixed variable name, such as
    /// `FILE_SPLIT_SIZE`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("JOB_RESULT_STORAGE_DIR") {
            self.job_result_storage_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = lookup("FILE_SPLIT_SIZE") {
            self.file_split_size = parse_var("FILE_SPLIT_SIZE", &value)?;
        }
        if let Some(value) = lookup("MAX_NUMBER_OF_SAMPLE") {
            self.max_number_of_sample = parse_var("MAX_NUMBER_OF_SAMPLE", &value)?;
        }
        if let Some(value) = lookup("MAX_CONCURRENT_JOBS") {
            self.max_concurrent_jobs = Some(parse_var("MAX_CONCURRENT_JOBS", &value)?);
        }
        if let Some(value) = lookup("LOOKUP_TIMEOUT_MS") {
            self.lookup_timeout_ms = parse_var("LOOKUP_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("VERBATIM_SAMPLE_SIZE") {
            self.verbatim_sample_size = parse_var("VERBATIM_SAMPLE_SIZE", &value)?;
        }
        if let Some(value) = lookup("LOG_FILTER") {
            self.log_filter = value;
        }
        if let Some(value) = lookup("LOG_FORMAT") {
            self.log_format = value.parse()?;
        }
        self.validate()?;
        debug!(config = ?self, "Loaded validator configuration");
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.file_split_size == 0 {
            return Err(ValidatorError::Configuration(
                "fileSplitSize must be greater than 0".to_string(),
            ));
        }
        if self.max_number_of_sample == 0 {
            return Err(ValidatorError::Configuration(
                "maxNumberOfSample must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_jobs == Some(0) {
            return Err(ValidatorError::Configuration(
                "maxConcurrentJobs must be greater than 0".to_string(),
            ));
        }
        logging::parse_filter(&self.log_filter)?;
        Ok(())
    }

    /// Installs the global `tracing` subscriber described by this
    /// configuration.
    ///
    /// ```rust,no_run
    /// use dwc_guard::config::ValidatorConfig;
    ///
    /// ValidatorConfig::from_env()?.init_logging()?;
    /// # Ok::<(), dwc_guard::error::ValidatorError>(())
    /// ```
    pub fn init_logging(&self) -> Result<()> {
        logging::init_logging(&self.log_filter, self.log_format)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            file_split_size: self.file_split_size,
            max_number_of_sample: self.max_number_of_sample,
            verbatim_sample_size: self.verbatim_sample_size,
        }
    }

    pub fn job_server_config(&self) -> JobServerConfig {
        let config = JobServerConfig::default().with_lookup_timeout(self.lookup_timeout());
        match self.max_concurrent_jobs {
            Some(max) => config.with_max_concurrent_jobs(max),
            None => config,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        ValidatorError::Configuration(format!("invalid {ENV_PREFIX}{name} '{value}': {e}"))
    })
}
