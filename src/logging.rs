use chrono::{SecondsFormat, Utc};
use hostname::get;
use serde::Serialize;
use serde_json::{Map, Value};
use std::env;
use std::io::{self, Write};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }
}

/// JSON-lines logger. Cheap to clone; every component receives its own copy
/// at construction time instead of reaching for a process-wide instance.
#[derive(Clone, Debug)]
pub struct Logger {
    service: Arc<str>,
    environment: Arc<str>,
    host: Arc<str>,
    min_level: LogLevel,
}

impl Logger {
    pub fn new(service: &'static str) -> Self {
        let environment = env::var("APP_ENV")
            .or_else(|_| env::var("RUST_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let host = get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .or_else(|| env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "unknown".to_string());
        let min_level = env::var("LOG_LEVEL")
            .ok()
            .map(|value| LogLevel::from_str(&value))
            .unwrap_or(LogLevel::Info);

        Self {
            service: Arc::from(service),
            environment: Arc::from(environment),
            host: Arc::from(host),
            min_level,
        }
    }

    /// Logger that drops every event. Used by tests.
    pub fn silent() -> Self {
        Self {
            service: Arc::from("silent"),
            environment: Arc::from("test"),
            host: Arc::from("localhost"),
            min_level: LogLevel::Off,
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        self.min_level != LogLevel::Off && level <= self.min_level
    }

    /// Fixed envelope fields followed by the event context. An object
    /// context is flattened into the record; anything else lands under
    /// `context`.
    fn record<T: Serialize>(&self, level: LogLevel, event: &str, context: T) -> Map<String, Value> {
        let mut record: Map<String, Value> = [
            (
                "timestamp",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("service", self.service.to_string()),
            ("env", self.environment.to_string()),
            ("host", self.host.to_string()),
            ("level", level.as_str().to_string()),
            ("event", event.to_string()),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value)))
        .collect();

        match serde_json::to_value(context).unwrap_or(Value::Null) {
            Value::Object(fields) => record.extend(fields),
            Value::Null => {}
            other => {
                record.insert("context".into(), other);
            }
        }
        record
    }

    fn emit<T: Serialize>(&self, level: LogLevel, event: &str, context: T) {
        if !self.should_log(level) {
            return;
        }
        let line = Value::Object(self.record(level, event, context));
        // write errors are dropped
        let _ = match level {
            LogLevel::Error | LogLevel::Warn => writeln!(io::stderr().lock(), "{line}"),
            _ => writeln!(io::stdout().lock(), "{line}"),
        };
    }

    pub fn debug<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Debug, event, context);
    }

    pub fn info<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Info, event, context);
    }

    pub fn warn<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Warn, event, context);
    }

    pub fn error<T: Serialize>(&self, event: &str, context: T) {
        self.emit(LogLevel::Error, event, context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_parsing_defaults_to_info() {
        assert_eq!(LogLevel::from_str("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("verbose"), LogLevel::Info);
    }

    #[test]
    fn record_flattens_object_context() {
        let logger = Logger::silent();
        let record = logger.record(
            LogLevel::Warn,
            "record.failed",
            serde_json::json!({ "stationId": "Alif-riyadh-SA", "event": "ignored" }),
        );

        assert_eq!(record["level"], "warn");
        assert_eq!(record["service"], "silent");
        assert_eq!(record["stationId"], "Alif-riyadh-SA");
        // context keys override envelope keys
        assert_eq!(record["event"], "ignored");
        assert!(record.contains_key("timestamp"));

        let record = logger.record(LogLevel::Info, "tick", 3);
        assert_eq!(record["context"], 3);
        assert_eq!(record["event"], "tick");
    }

    #[test]
    fn silent_logger_suppresses_everything() {
        let logger = Logger::silent();
        assert!(!logger.should_log(LogLevel::Error));
    }
}
