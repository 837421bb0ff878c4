use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub stations_file: PathBuf,
    pub user_agent: String,
    pub recording: RecordingConfig,
    pub resolver: ResolverConfig,
    pub verification: VerificationConfig,
    pub monitor: MonitorConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingConfig {
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
    pub seconds: u64,
    pub grace_seconds: u64,
    pub ffmpeg_binary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolverConfig {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationConfig {
    pub timeout_ms: u64,
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorConfig {
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    pub start_hour: u32,
    pub end_hour: u32,
    pub interval_minutes: u32,
    pub fixed_every_hours: u32,
    pub status_report_interval_seconds: u64,
    pub retry_policy: RetryPolicy,
}

/// What happens when a retry attempt itself fails.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Only a failure of the scheduled recording re-enqueues; a failed retry
    /// is counted but not retried again.
    Single,
    /// A failed retry re-enqueues itself while the monitor still allows it.
    Chained,
}

impl RetryPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(RetryPolicy::Single),
            "chained" => Ok(RetryPolicy::Chained),
            other => Err(ConfigError::Message(format!(
                "RETRY_POLICY must be `single` or `chained`, got `{other}`"
            ))),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let stations_file = PathBuf::from(
            env::var("STATIONS_FILE").unwrap_or_else(|_| "arab_stations.json".into()),
        );
        let user_agent = env::var("HTTP_USER_AGENT").unwrap_or_else(|_| "Mozilla/5.0".into());

        let config = Self {
            stations_file,
            user_agent,
            recording: RecordingConfig::from_env()?,
            resolver: ResolverConfig::from_env()?,
            verification: VerificationConfig::from_env()?,
            monitor: MonitorConfig::from_env()?,
            schedule: ScheduleConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::Message(
                "HTTP_USER_AGENT cannot be empty.".into(),
            ));
        }
        if self.recording.seconds == 0 {
            return Err(ConfigError::Message(
                "RECORDING_SECONDS must be greater than zero.".into(),
            ));
        }
        if self.verification.max_workers == 0 {
            return Err(ConfigError::Message(
                "VERIFY_MAX_WORKERS must be greater than zero.".into(),
            ));
        }
        self.schedule.validate()
    }
}

impl RecordingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            output_dir: PathBuf::from(
                env::var("RECORDINGS_DIR").unwrap_or_else(|_| "recordings".into()),
            ),
            log_file: PathBuf::from(
                env::var("RECORDINGS_LOG").unwrap_or_else(|_| "recordings_log.csv".into()),
            ),
            seconds: env_u64("RECORDING_SECONDS", 30)?,
            grace_seconds: env_u64("RECORDING_GRACE_SECONDS", 30)?,
            ffmpeg_binary: env::var("FFMPEG_BINARY").unwrap_or_else(|_| "ffmpeg".into()),
        })
    }
}

impl ResolverConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            timeout_ms: env_u64("RESOLVE_TIMEOUT_MS", 10_000)?,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl VerificationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            timeout_ms: env_u64("VERIFY_TIMEOUT_MS", 5000)?,
            max_workers: env_usize("VERIFY_MAX_WORKERS", 5)?.max(1),
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MonitorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_retries: env_u32("MONITOR_MAX_RETRIES", 3)?,
            retry_delay_seconds: env_u64("MONITOR_RETRY_DELAY_SECONDS", 300)?,
        })
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 300,
        }
    }
}

impl ScheduleConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let retry_policy = match env::var("RETRY_POLICY") {
            Ok(value) => RetryPolicy::parse(&value)?,
            Err(_) => RetryPolicy::Single,
        };
        Ok(Self {
            start_hour: env_u32("SCHEDULE_START_HOUR", 0)?,
            end_hour: env_u32("SCHEDULE_END_HOUR", 24)?,
            interval_minutes: env_u32("SCHEDULE_INTERVAL_MINUTES", 30)?,
            fixed_every_hours: env_u32("SCHEDULE_FIXED_EVERY_HOURS", 2)?,
            status_report_interval_seconds: env_u64("STATUS_REPORT_INTERVAL_SECONDS", 3600)?,
            retry_policy,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.start_hour > 23 {
            return Err(ConfigError::Message(
                "SCHEDULE_START_HOUR must be between 0 and 23.".into(),
            ));
        }
        if self.end_hour > 24 || self.end_hour <= self.start_hour {
            return Err(ConfigError::Message(
                "SCHEDULE_END_HOUR must be greater than SCHEDULE_START_HOUR and at most 24.".into(),
            ));
        }
        if self.interval_minutes == 0 {
            return Err(ConfigError::Message(
                "SCHEDULE_INTERVAL_MINUTES must be greater than zero.".into(),
            ));
        }
        if self.fixed_every_hours == 0 || self.fixed_every_hours > 24 {
            return Err(ConfigError::Message(
                "SCHEDULE_FIXED_EVERY_HOURS must be between 1 and 24.".into(),
            ));
        }
        if self.status_report_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "STATUS_REPORT_INTERVAL_SECONDS must be greater than zero.".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            start_hour: 0,
            end_hour: 24,
            interval_minutes: 30,
            fixed_every_hours: 2,
            status_report_interval_seconds: 3600,
            retry_policy: RetryPolicy::Single,
        }
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u32"))),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid u64"))),
        Err(_) => Ok(default),
    }
}

fn env_usize(key: &str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Message(format!("{key} must be a valid usize"))),
        Err(_) => Ok(default),
    }
}
