use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Log {
    console_enabled: bool,
    log_level: LogLevel,
    log_file: PathBuf,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            console_enabled: true,
            log_level: LogLevel::Info,
            log_file: PathBuf::from("brokerd.log"),
        }
    }
}

impl Log {
    #[must_use]
    pub const fn console_enabled(&self) -> bool {
        self.console_enabled
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn log_file(&self) -> &std::path::Path {
        &self.log_file
    }

    /// # Errors
    ///
    /// Returns an error if the log file's parent directory cannot be
    /// created.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(parent) = self.log_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
