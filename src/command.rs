use crate::prelude::*;

use crate::axpert::decoder::{OperationModeDecoder, SettingsDecoder, StatusDecoder};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// ASCII mnemonic sent on the wire, eg. `QPIGS`.
    pub code: String,
    /// Bytes to read back; the device may send fewer.
    pub size: usize,
    /// Parameter appended to `code` when the caller doesn't supply one.
    pub value: Option<String>,
    pub decoder: Option<Decoder>,
}

impl CommandSpec {
    pub fn new(code: &str, size: usize) -> Self {
        Self {
            code: code.to_string(),
            size,
            value: None,
            decoder: None,
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_decoder<D: Into<Decoder>>(mut self, decoder: D) -> Self {
        self.decoder = Some(decoder.into());
        self
    }

    /// The value that goes on the wire: the caller's, else our default.
    pub fn effective_value<'a>(&'a self, value: Option<&'a str>) -> Option<&'a str> {
        value.or(self.value.as_deref())
    }

    pub fn frame(&self, value: Option<&str>) -> Frame {
        Frame::new(&self.code, self.effective_value(value))
    }

    pub fn decode(&self, raw: &[u8]) -> Option<Record> {
        self.decoder.as_ref()?.decode(raw)
    }
}

/// Read-only command table shared by everything that talks to the inverter.
#[derive(Clone, Debug)]
pub struct Registry {
    commands: HashMap<String, CommandSpec>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Registry {
    pub const BUILTIN: [&'static str; 5] = [
        "status",
        "settings",
        "default_settings",
        "operation_mode",
        "float_voltage",
    ];

    pub fn builtin() -> Self {
        let commands = [
            ("status", CommandSpec::new("QPIGS", 110).with_decoder(StatusDecoder)),
            ("settings", CommandSpec::new("QPIRI", 110).with_decoder(SettingsDecoder)),
            ("default_settings", CommandSpec::new("QDI", 81)),
            ("operation_mode", CommandSpec::new("QMOD", 5).with_decoder(OperationModeDecoder)),
            // value is the voltage, eg. "52.8"
            ("float_voltage", CommandSpec::new("PBFT", 9)),
        ]
        .into_iter()
        .map(|(name, spec)| (name.to_string(), spec))
        .collect();

        Self { commands }
    }

    /// Built-in commands plus any declared in the config file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::builtin();

        for command in config.commands() {
            registry = registry.with_command(&command.name, command.spec())?;
        }

        Ok(registry)
    }

    pub fn with_command(mut self, name: &str, spec: CommandSpec) -> Result<Self> {
        if self.commands.contains_key(name) {
            bail!("command {} is already defined", name);
        }

        debug!("registering command {} as {:?}", name, spec);
        self.commands.insert(name.to_string(), spec);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
