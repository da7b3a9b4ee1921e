//! Log levels and the level-change listener table.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{warn, Level};

/// Verbosity of a context logger, from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Nothing is emitted.
    Off,
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages.
    #[default]
    Info,
    /// Debug output.
    Debug,
    /// Everything.
    Trace,
}

impl LogLevel {
    /// Returns the matching `tracing` level, `None` for [`LogLevel::Off`].
    #[must_use]
    pub fn as_tracing(self) -> Option<Level> {
        match self {
            Self::Off => None,
            Self::Error => Some(Level::ERROR),
            Self::Warn => Some(Level::WARN),
            Self::Info => Some(Level::INFO),
            Self::Debug => Some(Level::DEBUG),
            Self::Trace => Some(Level::TRACE),
        }
    }

    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Off,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "silent" => Ok(Self::Off),
            "error" | "fatal" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Handle returned by [`LevelListeners::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerKey(u64);

type Listener = Arc<dyn Fn(LogLevel) + Send + Sync>;

/// An explicitly owned table of level-change listeners.
///
/// Every registration must be paired with a [`deregister`](Self::deregister);
/// context loggers do this when their context completes.
#[derive(Default)]
pub struct LevelListeners {
    next: AtomicU64,
    listeners: Mutex<HashMap<ListenerKey, Listener>>,
}

impl LevelListeners {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn register(&self, listener: impl Fn(LogLevel) + Send + Sync + 'static) -> ListenerKey {
        let key = ListenerKey(self.next.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().insert(key, Arc::new(listener));
        key
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn deregister(&self, key: ListenerKey) -> bool {
        self.listeners.lock().remove(&key).is_some()
    }

    /// Calls every listener with `level`. A panicking listener is logged and
    /// skipped.
    pub fn notify(&self, level: LogLevel) {
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(level);
            })) {
                warn!("Level listener panicked: {:?}", e);
            }
        }
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns true if no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl fmt::Debug for LevelListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelListeners")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Trace > LogLevel::Debug);
        assert!(LogLevel::Error > LogLevel::Off);
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("silent".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Info.as_tracing(), Some(Level::INFO));
        assert_eq!(LogLevel::Off.as_tracing(), None);
    }

    #[test]
    fn test_level_u8_round_trip() {
        for level in [LogLevel::Off, LogLevel::Warn, LogLevel::Trace] {
            assert_eq!(LogLevel::from_u8(level.to_u8()), level);
        }
    }

    #[test]
    fn test_register_notify_deregister() {
        let listeners = LevelListeners::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let key = listeners.register(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(listeners.len(), 1);

        listeners.notify(LogLevel::Debug);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(listeners.deregister(key));
        assert!(!listeners.deregister(key));
        assert!(listeners.is_empty());

        listeners.notify(LogLevel::Warn);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
