//! Logger initialization (spec ambient stack): routes to stderr and a
//! size-rolled, gzip-compressed log file via `log4rs`.

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::{Log, LogLevel};
use crate::error::{Error, ErrorKind};

const LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const ROLLER_PATTERN: &str = ".{}.gz";
const ROLLER_COUNT: u32 = 10;

const STDOUT_NAME: &str = "stdout";
const ROLLER_NAME: &str = "roller";

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Off => LevelFilter::Off,
        LogLevel::Error => LevelFilter::Error,
        LogLevel::Warn => LevelFilter::Warn,
        LogLevel::Info => LevelFilter::Info,
        LogLevel::Debug => LevelFilter::Debug,
        LogLevel::Trace => LevelFilter::Trace,
    }
}

/// # Errors
///
/// Returns an error if the rolling policy or log4rs config cannot be
/// built, or a logger is already installed.
pub fn init_log(log_conf: &Log) -> Result<(), Error> {
    let level = level_filter(log_conf.log_level());

    let stdout = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d} {h({l})} - {m}{n}")))
        .build();

    let roller_path = log_conf.log_file().to_str().ok_or_else(|| {
        Error::from_string(ErrorKind::ConfigError, format!("invalid log file path {:?}", log_conf.log_file()))
    })?;
    let roller_pattern = format!("{roller_path}{ROLLER_PATTERN}");
    let roller = FixedWindowRoller::builder()
        .build(&roller_pattern, ROLLER_COUNT)
        .map_err(|err| Error::from_string(ErrorKind::LoggerError, format!("failed to build roller: {err}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_SIZE)), Box::new(roller));
    let file_appender = RollingFileAppender::builder()
        .build(log_conf.log_file(), Box::new(policy))
        .map_err(|err| Error::from_string(ErrorKind::LoggerError, format!("failed to build file appender: {err}")))?;

    let mut root_appenders = vec![ROLLER_NAME];
    if log_conf.console_enabled() {
        root_appenders.push(STDOUT_NAME);
    }

    let config = LogConfig::builder()
        .appender(Appender::builder().build(STDOUT_NAME, Box::new(stdout)))
        .appender(Appender::builder().build(ROLLER_NAME, Box::new(file_appender)))
        .build(Root::builder().appenders(root_appenders).build(level))
        .map_err(|err| Error::from_string(ErrorKind::LoggerError, format!("failed to build log4rs config: {err}")))?;

    log4rs::init_config(config).map_err(|err| Error::from_string(ErrorKind::LoggerError, format!("failed to init log4rs: {err}")))?;
    Ok(())
}
