//! Structured logger sitting alongside `tracing`: a small, swappable
//! observer interface for callers who want loop events as plain structs
//! (e.g. a CLI's `--verbose` text renderer) rather than tracing spans.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_u8(self) -> u8 {
        match self {
            LogLevel::Trace => 0,
            LogLevel::Debug => 1,
            LogLevel::Info => 2,
            LogLevel::Warn => 3,
            LogLevel::Error => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// One structured log record.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl LogEntry {
    fn render(&self, format: LogFormat) -> String {
        match format {
            LogFormat::Text => {
                let fields = self.fields.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(" ");
                if fields.is_empty() {
                    format!("[{}] {} {}: {}", self.timestamp.to_rfc3339(), self.level, self.component, self.message)
                } else {
                    format!("[{}] {} {}: {} {}", self.timestamp.to_rfc3339(), self.level, self.component, self.message, fields)
                }
            }
            LogFormat::Json => {
                let mut obj = serde_json::Map::new();
                obj.insert("timestamp".to_string(), serde_json::Value::String(self.timestamp.to_rfc3339()));
                obj.insert("level".to_string(), serde_json::Value::String(self.level.to_string()));
                obj.insert("component".to_string(), serde_json::Value::String(self.component.clone()));
                obj.insert("message".to_string(), serde_json::Value::String(self.message.clone()));
                for (k, v) in &self.fields {
                    obj.insert(k.clone(), serde_json::Value::String(v.clone()));
                }
                serde_json::to_string(&serde_json::Value::Object(obj)).unwrap_or_default()
            }
        }
    }
}

/// Anything that wants to receive log entries as they're emitted.
pub trait LogObserver: Send + Sync {
    fn on_log(&self, entry: &LogEntry);
}

/// Writes rendered entries to stderr; the default observer when none is configured.
pub struct ConsoleLogObserver {
    format: LogFormat,
}

impl ConsoleLogObserver {
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }
}

impl LogObserver for ConsoleLogObserver {
    fn on_log(&self, entry: &LogEntry) {
        eprintln!("{}", entry.render(self.format));
    }
}

/// Component-scoped logger. Cheap to construct; the minimum level is
/// shared process-wide through an atomic so `set_global_level` takes
/// effect on every existing `Logger` immediately.
pub struct Logger {
    component: String,
    observers: Arc<Mutex<Vec<Arc<dyn LogObserver>>>>,
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(2);

fn default_observers() -> &'static Arc<Mutex<Vec<Arc<dyn LogObserver>>>> {
    static OBSERVERS: OnceLock<Arc<Mutex<Vec<Arc<dyn LogObserver>>>>> = OnceLock::new();
    OBSERVERS.get_or_init(|| Arc::new(Mutex::new(vec![Arc::new(ConsoleLogObserver::new(LogFormat::Text)) as Arc<dyn LogObserver>])))
}

impl Logger {
    pub fn new(component: impl Into<String>) -> Self {
        Self { component: component.into(), observers: default_observers().clone() }
    }

    pub fn set_min_level(level: LogLevel) {
        MIN_LEVEL.store(level.as_u8(), Ordering::Relaxed);
    }

    pub fn min_level() -> LogLevel {
        LogLevel::from_u8(MIN_LEVEL.load(Ordering::Relaxed))
    }

    fn emit(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]) {
        if level.as_u8() < MIN_LEVEL.load(Ordering::Relaxed) {
            return;
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: self.component.clone(),
            message: message.to_string(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        };
        for observer in self.observers.lock().unwrap().iter() {
            observer.on_log(&entry);
        }
    }

    pub fn trace(&self, message: &str, fields: &[(&str, &str)]) {
        self.emit(LogLevel::Trace, message, fields);
    }
    pub fn debug(&self, message: &str, fields: &[(&str, &str)]) {
        self.emit(LogLevel::Debug, message, fields);
    }
    pub fn info(&self, message: &str, fields: &[(&str, &str)]) {
        self.emit(LogLevel::Info, message, fields);
    }
    pub fn warn(&self, message: &str, fields: &[(&str, &str)]) {
        self.emit(LogLevel::Warn, message, fields);
    }
    pub fn error(&self, message: &str, fields: &[(&str, &str)]) {
        self.emit(LogLevel::Error, message, fields);
    }
}

/// Process-wide logger accessor, used by code that doesn't own a `Logger`
/// of its own (background tasks, `Drop` impls).
pub struct GlobalLogger;

impl GlobalLogger {
    pub fn get() -> Logger {
        Logger::new("global")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingObserver(Arc<AtomicUsize>);
    impl LogObserver for CountingObserver {
        fn on_log(&self, _entry: &LogEntry) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn text_rendering_includes_fields() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            component: "test".to_string(),
            message: "hello".to_string(),
            fields: vec![("k".to_string(), "v".to_string())],
        };
        let rendered = entry.render(LogFormat::Text);
        assert!(rendered.contains("k=v"));
        assert!(rendered.contains("hello"));
    }

    #[test]
    fn json_rendering_is_valid_json() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Error,
            component: "test".to_string(),
            message: "boom".to_string(),
            fields: vec![],
        };
        let rendered = entry.render(LogFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["message"], "boom");
    }

    #[test]
    fn min_level_filters_quieter_logs() {
        Logger::set_min_level(LogLevel::Error);
        assert_eq!(Logger::min_level(), LogLevel::Error);
        Logger::set_min_level(LogLevel::Info);
    }
}
