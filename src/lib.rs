// Module declarations for the application's core components
pub mod axpert;    // Inverter wire protocol and response decoders
pub mod command;   // Command registry
pub mod config;    // Configuration management
pub mod connector; // Serial and USB-HID links
pub mod error;     // Error handling and types
pub mod executor;  // Serialised, de-duplicated bus access
pub mod options;   // Command line options parsing
pub mod prelude;   // Common imports and types

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::options::{Format, Options};
use crate::prelude::*;
use std::io::Write;
use std::sync::Arc;

/// Sets up env_logger with the bridge's log line format.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.module_path().unwrap_or(""),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .try_init();
}

/// Runs one command against the inverter and prints the response.
///
/// The connector is opened here and closed again before returning, whether
/// the exchange worked or not.
pub async fn app(options: Options, config: Config) -> Result<()> {
    info!("axpert-bridge {} starting", CARGO_PKG_VERSION);
    config.log_summary();

    let registry = Arc::new(Registry::from_config(&config)?);

    if options.list {
        for name in registry.names() {
            if let Some(spec) = registry.get(name) {
                println!("{:<20} {:<8} {:>4}", name, spec.code, spec.size);
            }
        }
        return Ok(());
    }

    let name = options
        .command
        .as_deref()
        .ok_or_else(|| anyhow!("no command given, use --list to see the known ones"))?;
    if !registry.contains(name) {
        bail!("unknown command {}, use --list to see the known ones", name);
    }

    let mut connector = DeviceConnector::from_config(config.connector());
    connector.open().await?;

    let executor = Executor::new(registry.clone(), connector, config.executor());

    let result = tokio::select! {
        result = executor.execute(name, options.value.as_deref()) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    };

    if let Err(e) = executor.close().await {
        warn!("failed to close connector: {}", e);
    }
    executor.stats().print_summary();

    let outcome = result?;
    report(&registry, name, &outcome, options.format)
}

fn report(registry: &Registry, name: &str, outcome: &Outcome, format: Format) -> Result<()> {
    match outcome.status {
        Status::Ok | Status::Unknown if outcome.data.is_some() => {}
        Status::ProtocolError => bail!(
            "command not understood by inverter: {}",
            outcome.data_lossy()
        ),
        Status::Busy => bail!("bus busy, {} was not sent", name),
        _ => bail!("unknown error, no data was returned"),
    }

    let decoded = registry.get(name).and_then(|spec| spec.decode(outcome.data()));

    match (format, decoded) {
        (Format::Json, Some(record)) => println!("{}", serde_json::to_string(&record)?),
        (Format::Json, None) => {
            warn!("{} has no JSON decoder, printing raw response", name);
            println!("{}", printable(outcome));
        }
        (Format::Raw, _) => println!("{}", printable(outcome)),
    }

    Ok(())
}

fn printable(outcome: &Outcome) -> String {
    outcome
        .data_lossy()
        .trim_end_matches(|c: char| c == '\r' || c == '\0')
        .to_string()
}
