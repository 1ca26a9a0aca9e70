//! Logging facilities to record engine decisions during a run.

use std::fs::File;

use log::Level;
use serde::Serialize;

pub trait Logger {
    fn log(&mut self, level: Level, time: f64, component: &str, message: String);

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error>;
}

/// Forwards entries to the `log` crate facade.
#[derive(Default)]
pub struct StdoutLogger;

impl StdoutLogger {
    pub fn new() -> Self {
        Self {}
    }
}

impl Logger for StdoutLogger {
    fn log(&mut self, level: Level, time: f64, component: &str, message: String) {
        log::log!(level, "[{:.3}] {}: {}", time, component, message);
    }

    fn save_log(&self, _path: &str) -> Result<(), std::io::Error> {
        Ok(())
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: f64,
    component: String,
    message: String,
}

/// Buffers entries in memory and saves them as CSV.
pub struct FileLogger {
    log: Vec<LogEntry>,
    level: Level,
}

impl Default for FileLogger {
    fn default() -> Self {
        Self {
            log: Vec::new(),
            level: Level::Info,
        }
    }
}

impl FileLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(level: Level) -> Self {
        Self { log: Vec::new(), level }
    }
}

impl Logger for FileLogger {
    fn log(&mut self, level: Level, time: f64, component: &str, message: String) {
        if self.level < level {
            return;
        }
        self.log.push(LogEntry {
            timestamp: time,
            component: component.to_string(),
            message,
        });
    }

    fn save_log(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for entry in &self.log {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Initializes the env_logger backend for binaries and tests.
pub fn init_logger() {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_logger_respects_level_and_saves_csv() {
        let mut logger = FileLogger::with_level(Level::Info);
        logger.log(Level::Info, 1.0, "scheduler", "placed vm 7".to_string());
        logger.log(Level::Trace, 2.0, "scheduler", "ignored".to_string());

        let path = std::env::temp_dir().join("secure-iaas-logger-test.csv");
        let path = path.to_str().unwrap();
        logger.save_log(path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("placed vm 7"));
        assert!(!content.contains("ignored"));
        std::fs::remove_file(path).ok();
    }
}
