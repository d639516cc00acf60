use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub connector: Connector,

    #[serde(default)]
    pub executor: Executor,

    #[serde(default = "Vec::new")]
    pub commands: Vec<Command>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Connector {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Connector {
    pub kind: ConnectorKind,

    /// Candidate device paths, tried in order.
    pub devices: Vec<String>,

    #[serde(default = "Config::default_baud_rate")]
    pub baud_rate: u32,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "read_timeout_ms", default = "Config::default_read_timeout")]
    pub read_timeout: Duration,

    #[serde(default)]
    pub retry: Retry,
}
impl Connector {
    pub fn kind(&self) -> ConnectorKind {
        self.kind
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn retry(&self) -> &Retry {
        &self.retry
    }
} // }}}

// Retry {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Retry {
    #[serde(default = "Config::default_max_retries")]
    pub max_retries: u32,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "delay_ms", default = "Config::default_retry_delay")]
    pub delay: Duration,

    #[serde(default = "Config::default_backoff")]
    pub backoff: f64,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_delay_ms", default = "Config::default_max_retry_delay")]
    pub max_delay: Duration,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_retries: Config::default_max_retries(),
            delay: Config::default_retry_delay(),
            backoff: Config::default_backoff(),
            max_delay: Config::default_max_retry_delay(),
        }
    }
}

impl Retry {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.delay)
            .with_backoff(self.backoff, self.max_delay)
    }
} // }}}

// Executor {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Executor {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "lock_timeout_ms", default = "Config::default_lock_timeout")]
    pub lock_timeout: Duration,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "cache_window_ms", default = "Config::default_cache_window")]
    pub cache_window: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            lock_timeout: Config::default_lock_timeout(),
            cache_window: Config::default_cache_window(),
        }
    }
}

impl Executor {
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn cache_window(&self) -> Duration {
        self.cache_window
    }
} // }}}

// Command {{{
/// Extra command beyond the built-in table, eg. for a newer firmware query.
#[derive(Clone, Debug, Deserialize)]
pub struct Command {
    pub name: String,
    pub code: String,
    pub size: usize,
    pub value: Option<String>,
}

impl Command {
    pub fn spec(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.code, self.size);
        match &self.value {
            Some(value) => spec.with_value(value),
            None => spec,
        }
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| file_error!("error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Connector: {:?}", self.connector.kind);
        for (i, device) in self.connector.devices.iter().enumerate() {
            info!("    Device[{}]: {}", i, device);
        }
        if self.connector.kind == ConnectorKind::Serial {
            info!("    Baud rate: {}", self.connector.baud_rate);
        }
        info!("    Read timeout: {}ms", self.connector.read_timeout.as_millis());
        info!(
            "    Retry: {} attempts, {}ms delay, backoff x{}",
            self.connector.retry.max_retries,
            self.connector.retry.delay.as_millis(),
            self.connector.retry.backoff
        );
        info!("  Executor:");
        info!("    Lock timeout: {}ms", self.executor.lock_timeout.as_millis());
        info!("    Cache window: {}ms", self.executor.cache_window.as_millis());
        info!("  Extra commands: {}", self.commands.len());
        for command in &self.commands {
            info!("    {}: {} ({} bytes)", command.name, command.code, command.size);
        }
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.connector.devices.is_empty() {
            bail!("connector.devices must list at least one device");
        }
        if self.connector.devices.iter().any(|d| d.trim().is_empty()) {
            return Err(file_error!("device path cannot be empty"));
        }
        if self.connector.baud_rate == 0 {
            bail!("connector.baud_rate must be greater than 0");
        }
        if self.connector.read_timeout.is_zero() {
            return Err(file_error!("invalid read timeout: 0"));
        }
        if !(self.connector.retry.backoff >= 1.0) {
            bail!(
                "connector.retry.backoff must be at least 1.0, got {}",
                self.connector.retry.backoff
            );
        }

        for (i, command) in self.commands.iter().enumerate() {
            if command.name.is_empty() {
                bail!("commands[{}].name cannot be empty", i);
            }
            if command.code.is_empty() || !command.code.is_ascii() {
                bail!("commands[{}].code must be non-empty ASCII", i);
            }
            if command.size == 0 {
                bail!("commands[{}].size must be greater than 0", i);
            }
            if self.commands[..i].iter().any(|c| c.name == command.name) {
                bail!("commands[{}]: duplicate command name {}", i, command.name);
            }
        }

        Ok(())
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_baud_rate() -> u32 {
        2400
    }

    fn default_read_timeout() -> Duration {
        Duration::from_secs(1)
    }

    fn default_max_retries() -> u32 {
        5
    }

    fn default_retry_delay() -> Duration {
        Duration::from_secs(5)
    }

    fn default_backoff() -> f64 {
        1.0
    }

    fn default_max_retry_delay() -> Duration {
        Duration::from_secs(30)
    }

    fn default_lock_timeout() -> Duration {
        Duration::from_secs(2)
    }

    fn default_cache_window() -> Duration {
        Duration::from_secs(2)
    }
}
