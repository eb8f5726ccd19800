use std::sync::Arc;

use clap::Parser;

use crate::auth::{AllowAll, Hooks};
use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::event::EventBus;

const DEFAULT_CONFIG: &str = "/etc/brokerd/brokerd.toml";

#[derive(Debug, Parser)]
#[command(name = "brokerd", version, about = "MQTT 3.1 broker")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    config: String,

    /// Parse and validate the config file, then exit.
    #[arg(short = 't', long = "test-config")]
    test_config: bool,
}

impl super::ServerContext {
    #[must_use]
    pub fn new(config: Config, hooks: Arc<dyn Hooks>) -> Self {
        let (events, _receiver) = EventBus::new();
        Self { config, hooks, events }
    }

    fn with_default_hooks(config: Config) -> Self {
        Self::new(config, Arc::new(AllowAll))
    }

    /// Loads config from `path`; a missing file falls back to in-code
    /// defaults rather than erroring, matching how the broker is expected
    /// to run out of the box before any file is installed.
    fn load_config(path: &str) -> Result<Config, Error> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("server: no config file at {path}, using defaults");
                return Ok(Config::default());
            }
            Err(err) => return Err(err.into()),
        };
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Entry point of the server binary: parses CLI flags, loads and
/// validates config, then either exits (`--test-config`) or hands off to
/// the async supervisor loop.
///
/// # Errors
///
/// Returns an error if the config file cannot be read/parsed, fails
/// validation, or the tokio runtime cannot be started.
pub fn run_server() -> Result<(), Error> {
    let cli = Cli::parse();

    let config = super::ServerContext::load_config(&cli.config)?;

    if cli.test_config {
        config.validate()?;
        println!("configuration file {} is valid", cli.config);
        return Ok(());
    }
    config.validate()?;

    crate::log::init_log(config.log())?;

    let runtime = tokio::runtime::Runtime::new().map_err(|err| Error::from_string(ErrorKind::IoError, err.to_string()))?;
    let mut server = super::ServerContext::with_default_hooks(config);
    runtime.block_on(server.run_loop())
}
