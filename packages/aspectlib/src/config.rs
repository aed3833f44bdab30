//! Configuration-driven weaving.
//!
//! Loads `aspects.toml`:
//!
//! ```toml
//! [retry]
//! retries = 3
//! backoff = "exponential"   # "none", "straight", "flat", or seconds
//! kinds = ["io", "timeout"]
//!
//! [log]
//! level = "info"
//! arguments = true
//!
//! [[weave]]
//! target = "billing.charge"
//! advice = ["log", "retry"]
//! ```

use std::path::{Path, PathBuf};

use aspectlib_core::AdviceRegistry;
use serde::{Deserialize, Serialize};

use crate::contrib::{default_kinds, Backoff, Retry, DEFAULT_RETRIES};
use crate::debug::{log_calls, LogOptions, LogSink};
use crate::error::WeaveError;
use crate::weave::{Namespace, Rollback};

pub const CONFIG_FILE: &str = "aspects.toml";

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Targets to weave, in order.
    #[serde(default, rename = "weave")]
    pub weaves: Vec<WeaveEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffName {
    #[default]
    None,
    Exponential,
    Straight,
    Flat,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum BackoffSetting {
    Named(BackoffName),
    Seconds(f64),
}

impl Default for BackoffSetting {
    fn default() -> Self {
        BackoffSetting::Named(BackoffName::None)
    }
}

impl From<&BackoffSetting> for Backoff {
    fn from(setting: &BackoffSetting) -> Self {
        match setting {
            BackoffSetting::Named(BackoffName::None) => Backoff::None,
            BackoffSetting::Named(BackoffName::Exponential) => Backoff::Exponential,
            BackoffSetting::Named(BackoffName::Straight) => Backoff::Straight,
            BackoffSetting::Named(BackoffName::Flat) => Backoff::Flat,
            BackoffSetting::Seconds(seconds) => Backoff::Fixed(*seconds),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default)]
    pub backoff: BackoffSetting,

    /// Failure kinds to retry; empty retries any failure.
    #[serde(default = "default_kinds")]
    pub kinds: Vec<String>,
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            backoff: BackoffSetting::default(),
            kinds: default_kinds(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    #[default]
    Debug,
    Trace,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default = "default_true")]
    pub arguments: bool,

    #[serde(default = "default_true")]
    pub result: bool,

    #[serde(default = "default_true")]
    pub strip_non_ascii: bool,

    /// Caller frames per logged call; `0` disables.
    #[serde(default)]
    pub stacktrace: usize,

    #[serde(default = "default_align_stacktrace")]
    pub align_stacktrace: usize,
}

fn default_true() -> bool {
    true
}

fn default_align_stacktrace() -> usize {
    60
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            arguments: true,
            result: true,
            strip_non_ascii: true,
            stacktrace: 0,
            align_stacktrace: default_align_stacktrace(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WeaveEntry {
    pub target: String,

    /// Advice names, outermost first.
    #[serde(default)]
    pub advice: Vec<String>,
}

/// Find `aspects.toml` starting from a path and walking up.
pub fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, WeaveError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, WeaveError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| WeaveError::io(path, source))?;
        let config = Self::from_toml_str(&content)?;
        log::debug!(
            "loaded {} weave entries from {}",
            config.weaves.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load the nearest `aspects.toml` at or above `start_path`, if any.
    pub fn discover(start_path: &Path) -> Result<Option<Self>, WeaveError> {
        match find_config_file(start_path) {
            Some(path) => Self::load(&path).map(Some),
            None => Ok(None),
        }
    }

    pub fn retry_policy(&self) -> Retry {
        Retry::new()
            .retries(self.retry.retries)
            .backoff(Backoff::from(&self.retry.backoff))
            .kinds(self.retry.kinds.iter().cloned())
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            arguments: self.log.arguments,
            result: self.log.result,
            strip_non_ascii: self.log.strip_non_ascii,
            stacktrace: self.log.stacktrace,
            align_stacktrace: self.log.align_stacktrace,
            sink: LogSink::Log(self.log.level.into()),
        }
    }

    /// Weave every entry, outermost advice first. If any entry fails, the
    /// entries already applied are rolled back and nothing stays woven.
    pub fn apply(
        &self,
        namespace: &Namespace,
        registry: &AdviceRegistry,
    ) -> Result<Rollback, WeaveError> {
        let mut applied = Rollback::new();
        for entry in &self.weaves {
            match Self::apply_entry(entry, namespace, registry) {
                Ok(rollback) => applied.merge(rollback),
                Err(err) => {
                    log::warn!("weaving {} failed: {err}", entry.target);
                    applied.rollback();
                    return Err(err);
                }
            }
        }
        Ok(applied)
    }

    fn apply_entry(
        entry: &WeaveEntry,
        namespace: &Namespace,
        registry: &AdviceRegistry,
    ) -> Result<Rollback, WeaveError> {
        if entry.advice.is_empty() {
            return Err(WeaveError::expected_advice(&entry.target));
        }
        let chain = registry.chain(entry.advice.iter().map(String::as_str))?;
        namespace.weave(&entry.target, chain)
    }
}

/// The advice a configuration can name: `retry` and `log`, set up from the
/// `[retry]` and `[log]` sections.
pub fn builtin_registry(config: &Config) -> AdviceRegistry {
    let mut registry = AdviceRegistry::new();
    registry.register("retry", config.retry_policy());
    registry.register("log", log_calls(config.log_options()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.retry.retries, DEFAULT_RETRIES);
        assert_eq!(config.retry.kinds, vec!["io", "os", "eof"]);
        assert_eq!(config.retry.backoff, BackoffSetting::Named(BackoffName::None));
        assert_eq!(config.log.level, LogLevel::Debug);
        assert!(config.log.strip_non_ascii);
        assert!(config.weaves.is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_toml_str(
            r#"
            [retry]
            retries = 2
            backoff = 0.25
            kinds = []

            [log]
            level = "warn"
            result = false
            stacktrace = 5

            [[weave]]
            target = "a.b"
            advice = ["log", "retry"]
            "#,
        )
        .unwrap();
        assert_eq!(config.retry.retries, 2);
        assert_eq!(config.retry.backoff, BackoffSetting::Seconds(0.25));
        assert!(config.retry.kinds.is_empty());
        assert_eq!(config.log.level, LogLevel::Warn);
        assert!(!config.log.result);
        assert_eq!(config.log_options().stacktrace, 5);
        assert_eq!(config.log_options().align_stacktrace, 60);
        assert_eq!(
            config.weaves,
            vec![WeaveEntry {
                target: "a.b".to_string(),
                advice: vec!["log".to_string(), "retry".to_string()],
            }]
        );

        let named = Config::from_toml_str("[retry]\nbackoff = \"flat\"").unwrap();
        assert_eq!(named.retry.backoff, BackoffSetting::Named(BackoffName::Flat));
    }

    #[test]
    fn test_invalid_config() {
        let err = Config::from_toml_str("[retry]\nbackoff = \"sometimes\"").unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
        let err = Config::from_toml_str("[log]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
    }

    #[test]
    fn test_discover_walks_up() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(Config::discover(&nested).unwrap().is_none());

        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[[weave]]\ntarget = \"x.y\"\nadvice = [\"log\"]\n",
        )
        .unwrap();
        let config = Config::discover(&nested).unwrap().unwrap();
        assert_eq!(config.weaves[0].target, "x.y");
        assert_eq!(
            find_config_file(&nested),
            Some(temp.path().join(CONFIG_FILE))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(&temp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, WeaveError::Io { .. }));
    }

    #[test]
    fn test_huge_configured_backoff_does_not_panic() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::{Arc, Mutex};
        use std::time::Duration;

        use aspectlib_core::{Args, Failure, Interceptor, Operation, Value};

        let config = Config::from_toml_str("[retry]\nbackoff = 1e30").unwrap();
        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&slept);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = config
            .retry_policy()
            .sleep(move |delay| recorded.lock().unwrap().push(delay))
            .wrap(Operation::plain("once", move |_args: Args| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Failure::new("io", "reset"))
                } else {
                    Ok(Value::from("ok"))
                }
            }));
        assert_eq!(op.call(Args::new()).unwrap(), Value::from("ok"));
        assert_eq!(*slept.lock().unwrap(), vec![Duration::MAX]);
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry(&Config::default());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["log", "retry"]);
    }
}
