use clap::{Parser, ValueEnum};

/// Axpert Bridge - talk to an Axpert-family inverter over serial or USB-HID
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Value for commands that change a setting, eg. 52.8 for float_voltage
    #[clap(short = 'v', long = "value")]
    pub value: Option<String>,

    /// Output format for the response
    #[clap(short = 'f', long = "format", value_enum, default_value_t = Format::Raw)]
    pub format: Format,

    /// List known commands and exit
    #[clap(short = 'l', long = "list")]
    pub list: bool,

    /// Command to execute, eg. status or operation_mode
    pub command: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Raw,
    Json,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}
