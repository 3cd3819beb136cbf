//! 日志初始化
//!
//! 级别和格式可以来自代码、环境变量（`RUST_LOG` / `LOG_LEVEL` / `LOG_FORMAT`）
//! 或配置键（`logging.level` / `logging.format` / `logging.filter` / `logging.show-target`），
//! 后者覆盖前者。

use std::fmt;
use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::Environment;
use crate::error::{ApplicationError, ApplicationResult};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 紧凑格式（默认）
    Compact,
    /// 完整格式
    Full,
    Json,
    /// 多行美化格式，适合开发
    Pretty,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// 显示模块路径
    pub show_target: bool,
    pub show_thread_ids: bool,
    /// `EnvFilter` 指令，例如 `lattice_core=debug,lattice_aop=trace`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 默认配置叠加进程环境变量
    pub fn from_env() -> Self {
        Self::default().with_env_vars(|key| std::env::var(key).ok())
    }

    /// 叠加环境变量；无法解析的值被忽略
    pub fn with_env_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(filter) = var("RUST_LOG").filter(|f| !f.is_empty()) {
            self.filter = Some(filter);
        }
        if let Some(level) = var("LOG_LEVEL").and_then(|l| l.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = var("LOG_FORMAT").and_then(|f| f.parse().ok()) {
            self.format = format;
        }
        self
    }

    /// 叠加 `logging.*` 配置键，值不合法时报错
    pub fn with_environment(mut self, env: &Environment) -> ApplicationResult<Self> {
        if let Some(level) = env.get_string("logging.level") {
            self.level = level.parse().map_err(ApplicationError::ConfigLoadFailed)?;
        }
        if let Some(format) = env.get_string("logging.format") {
            self.format = format.parse().map_err(ApplicationError::ConfigLoadFailed)?;
        }
        if let Some(filter) = env.get_string("logging.filter") {
            self.filter = Some(filter);
        }
        if let Some(show) = env.get_bool("logging.show-target") {
            self.show_target = show;
        }
        Ok(self)
    }

    /// 自定义过滤器不合法时退回到级别
    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|e| {
                eprintln!("Ignoring invalid log filter '{}': {}", directives, e);
                fallback()
            }),
            None => fallback(),
        }
    }

    /// 安装全局订阅者；已经安装过时返回错误
    pub fn init(&self) -> ApplicationResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter())
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        result.map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapPropertySource;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_level_and_format_parsing() {
        assert_eq!(" Warning ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("TRACE".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("verbose".parse::<LogLevel>().is_err());
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::Pretty.to_string(), "pretty");
    }

    #[test]
    fn test_env_vars_overlay() {
        let vars: HashMap<&str, &str> = [("LOG_LEVEL", "debug"), ("LOG_FORMAT", "bogus"), ("RUST_LOG", "lattice_core=trace")]
            .into_iter()
            .collect();
        let config = LoggingConfig::new().with_env_vars(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.filter.as_deref(), Some("lattice_core=trace"));
    }

    #[test]
    fn test_environment_keys_override() {
        let env = Environment::new();
        env.add_property_source(Arc::new(
            MapPropertySource::new("app")
                .with_property("logging.level", "error")
                .with_property("logging.format", "full")
                .with_property("logging.show-target", true),
        ));
        let config = LoggingConfig::new().with_environment(&env).unwrap();
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.format, LogFormat::Full);
        assert!(config.show_target);

        let bad = Environment::new();
        bad.add_property_source(Arc::new(MapPropertySource::new("bad").with_property("logging.level", "loud")));
        assert!(matches!(
            LoggingConfig::new().with_environment(&bad),
            Err(ApplicationError::ConfigLoadFailed(_))
        ));
    }
}
