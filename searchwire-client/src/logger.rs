//! Error, info and trace log sinks.

use std::fmt;
use std::sync::Arc;

/// A log sink.
///
/// Implemented for any `Fn(&str) + Send + Sync` closure.
pub trait Logger: Send + Sync {
    /// Record one message.
    fn log(&self, message: &str);
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn log(&self, message: &str) {
        self(message)
    }
}

/// Forwards messages to `tracing` at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: tracing::Level,
}

impl TracingLogger {
    /// Create a logger emitting at `level`.
    pub fn new(level: tracing::Level) -> Self {
        Self { level }
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        use tracing::Level;

        if self.level == Level::ERROR {
            tracing::error!(target: "searchwire", "{}", message);
        } else if self.level == Level::WARN {
            tracing::warn!(target: "searchwire", "{}", message);
        } else if self.level == Level::INFO {
            tracing::info!(target: "searchwire", "{}", message);
        } else if self.level == Level::DEBUG {
            tracing::debug!(target: "searchwire", "{}", message);
        } else {
            tracing::trace!(target: "searchwire", "{}", message);
        }
    }
}

/// The three independent sinks of a client.
#[derive(Clone, Default)]
pub struct Loggers {
    /// Receives node failures.
    pub error: Option<Arc<dyn Logger>>,
    /// Receives one line per successful request.
    pub info: Option<Arc<dyn Logger>>,
    /// Receives raw request and response dumps.
    pub trace: Option<Arc<dyn Logger>>,
}

impl Loggers {
    /// Whether the trace sink is set.
    pub fn tracing_enabled(&self) -> bool {
        self.trace.is_some()
    }

    /// Log to the error sink. `message` only runs when the sink is set.
    pub fn error(&self, message: impl FnOnce() -> String) {
        emit(&self.error, message);
    }

    /// Log to the info sink.
    pub fn info(&self, message: impl FnOnce() -> String) {
        emit(&self.info, message);
    }

    /// Log to the trace sink.
    pub fn trace(&self, message: impl FnOnce() -> String) {
        emit(&self.trace, message);
    }
}

fn emit(sink: &Option<Arc<dyn Logger>>, message: impl FnOnce() -> String) {
    if let Some(sink) = sink {
        sink.log(&message());
    }
}

impl fmt::Debug for Loggers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loggers")
            .field("error", &self.error.is_some())
            .field("info", &self.info.is_some())
            .field("trace", &self.trace.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_closure_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let loggers = Loggers {
            info: Some(Arc::new(move |m: &str| sink.lock().push(m.to_string()))),
            ..Default::default()
        };

        loggers.info(|| "GET http://localhost:9200/".to_string());
        loggers.error(|| "unused".to_string());

        assert_eq!(*lines.lock(), vec!["GET http://localhost:9200/".to_string()]);
    }

    #[test]
    fn test_unset_sink_skips_formatting() {
        let loggers = Loggers::default();
        loggers.trace(|| panic!("formatter must not run without a sink"));
        assert!(!loggers.tracing_enabled());
    }

    #[test]
    fn test_tracing_logger_all_levels() {
        for level in [
            tracing::Level::ERROR,
            tracing::Level::WARN,
            tracing::Level::INFO,
            tracing::Level::DEBUG,
            tracing::Level::TRACE,
        ] {
            TracingLogger::new(level).log("message");
        }
    }
}
