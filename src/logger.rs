//! Diagnostic channel.
//!
//! Every pipeline carries its own [`Logger`]; there is no process-wide handler to
//! swap. Without an explicit handler messages go to the `log` facade, so a binary
//! that initializes `env_logger` sees them like any other crate's output.

use std::fmt::Arguments;
use std::sync::Arc;

pub use log::Level;

/// Receives formatted diagnostic messages from a pipeline.
pub trait LogHandler: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

impl<F> LogHandler for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn log(&self, level: Level, message: &str) {
        self(level, message)
    }
}

/// Forwards to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFacade;

impl LogHandler for LogFacade {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "lite_encoder", level, "{}", message);
    }
}

#[derive(Clone)]
pub struct Logger {
    handler: Arc<dyn LogHandler>,
    facade: bool,
}

impl Logger {
    pub fn new(handler: Arc<dyn LogHandler>) -> Self {
        Self {
            handler,
            facade: false,
        }
    }

    pub fn emit(&self, level: Level, args: Arguments<'_>) {
        // formatting is skipped entirely when the facade would drop the record
        if !self.enabled(level) {
            return;
        }
        match args.as_str() {
            Some(s) => self.handler.log(level, s),
            None => self.handler.log(level, &args.to_string()),
        }
    }

    pub fn error(&self, args: Arguments<'_>) {
        self.emit(Level::Error, args);
    }

    pub fn warn(&self, args: Arguments<'_>) {
        self.emit(Level::Warn, args);
    }

    pub fn info(&self, args: Arguments<'_>) {
        self.emit(Level::Info, args);
    }

    pub fn debug(&self, args: Arguments<'_>) {
        self.emit(Level::Debug, args);
    }

    pub fn trace(&self, args: Arguments<'_>) {
        self.emit(Level::Trace, args);
    }

    fn enabled(&self, level: Level) -> bool {
        // custom handlers always receive everything
        !self.facade || level <= log::max_level()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            handler: Arc::new(LogFacade),
            facade: true,
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}
