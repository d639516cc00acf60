use crate::prelude::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Command name plus the value that went on the wire.
type CacheKey = (String, Option<String>);

struct CacheEntry {
    outcome: Outcome,
    at: Instant,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub transactions: u64,
    pub cache_hits: u64,
    pub busy: u64,
    pub ok: u64,
    pub protocol_errors: u64,
    pub unknown: u64,
    pub io_errors: u64,
}

impl ExecutorStats {
    pub fn print_summary(&self) {
        info!("Executor Statistics:");
        info!("  Bus transactions: {}", self.transactions);
        info!("  Served from cache: {}", self.cache_hits);
        info!("  Rejected as busy: {}", self.busy);
        info!("  Outcomes:");
        info!("    OK: {}", self.ok);
        info!("    NAK: {}", self.protocol_errors);
        info!("    Unknown: {}", self.unknown);
        info!("  I/O errors: {}", self.io_errors);
    }

    fn record(&mut self, outcome: &Outcome) {
        self.transactions += 1;
        match outcome.status {
            Status::Ok => self.ok += 1,
            Status::ProtocolError => self.protocol_errors += 1,
            Status::Unknown => self.unknown += 1,
            Status::Busy => self.busy += 1,
        }
    }
}

/// Single owner of the inverter bus.
///
/// Every exchange runs under one lock so requests from concurrent callers
/// never interleave on the wire. A caller that can't get the lock within
/// `lock_timeout` gets [`Status::Busy`] back without any I/O. Successful
/// results are kept for `cache_window` and handed to identical requests,
/// including ones that were queued behind the request that produced them.
pub struct Executor<C: Connector> {
    registry: Arc<Registry>,
    bus: tokio::sync::Mutex<C>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
    lock_timeout: Duration,
    cache_window: Duration,
    stats: Mutex<ExecutorStats>,
}

impl<C: Connector> Executor<C> {
    pub fn new(registry: Arc<Registry>, connector: C, config: &config::Executor) -> Self {
        Self::with_timeouts(
            registry,
            connector,
            config.lock_timeout(),
            config.cache_window(),
        )
    }

    pub fn with_timeouts(
        registry: Arc<Registry>,
        connector: C,
        lock_timeout: Duration,
        cache_window: Duration,
    ) -> Self {
        Self {
            registry,
            bus: tokio::sync::Mutex::new(connector),
            cache: Mutex::new(HashMap::new()),
            lock_timeout,
            cache_window,
            stats: Mutex::new(ExecutorStats::default()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Runs `name` against the inverter, or returns a recent identical result.
    ///
    /// `value` overrides the command's default parameter. Connector failures
    /// (including an exhausted retry budget) come back as `Err`; NAKs,
    /// unmarked responses and a busy bus are all `Ok(Outcome)`.
    pub async fn execute(&self, name: &str, value: Option<&str>) -> Result<Outcome> {
        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| anyhow!("unknown command {}", name))?;
        let value = spec.effective_value(value);
        let key: CacheKey = (name.to_string(), value.map(str::to_string));

        if let Some(outcome) = self.cached(&key) {
            debug!("{}: served from cache", name);
            return Ok(outcome);
        }

        let mut bus = match tokio::time::timeout(self.lock_timeout, self.bus.lock()).await {
            Ok(bus) => bus,
            Err(_) => {
                warn!(
                    "{}: bus still busy after {}ms, not sending",
                    name,
                    self.lock_timeout.as_millis()
                );
                self.update_stats(|s| s.busy += 1);
                return Ok(Outcome::busy());
            }
        };

        // whoever held the lock may have just fetched this for us
        if let Some(outcome) = self.cached(&key) {
            debug!("{}: served from cache after waiting for the bus", name);
            return Ok(outcome);
        }

        let result = Self::transact(&mut *bus, spec, value).await;
        drop(bus);

        match result {
            Ok(outcome) => {
                self.update_stats(|s| s.record(&outcome));
                match outcome.status {
                    Status::ProtocolError => {
                        warn!("{}: command not understood by inverter: {:?}", name, outcome.data_lossy())
                    }
                    Status::Unknown if outcome.data.is_none() => {
                        warn!("{}: no data was returned", name)
                    }
                    _ => {}
                }

                if outcome.is_cacheable() {
                    self.store(key, &outcome);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.update_stats(|s| s.io_errors += 1);
                error!("{}: {}", name, e);
                Err(e.into())
            }
        }
    }

    /// Executes `name` and runs the response through the command's decoder.
    /// `None` when the command has no decoder or nothing usable came back,
    /// which includes a NAK and a busy bus.
    pub async fn query(&self, name: &str, value: Option<&str>) -> Result<Option<Record>> {
        let outcome = self.execute(name, value).await?;
        if !outcome.is_usable() {
            debug!("{}: {} response, nothing to decode", name, outcome.status);
            return Ok(None);
        }

        let spec = self
            .registry
            .get(name)
            .ok_or_else(|| anyhow!("unknown command {}", name))?;

        Ok(outcome.data.as_deref().and_then(|data| spec.decode(data)))
    }

    /// Closes the connector once any in-flight exchange has finished.
    pub async fn close(&self) -> Result<()> {
        let mut bus = self.bus.lock().await;
        bus.close().await?;
        Ok(())
    }

    async fn transact(
        connector: &mut C,
        spec: &CommandSpec,
        value: Option<&str>,
    ) -> Result<Outcome, ConnectorError> {
        let frame = Frame::new(&spec.code, value);
        debug!("request {} sent as {:?}", spec.code, frame);

        connector.write_frame(&frame).await?;
        let response = connector.read(spec.size).await?;

        debug!(
            "response to {} ({} bytes): {:?}",
            spec.code,
            response.len(),
            String::from_utf8_lossy(&response)
        );

        Ok(Outcome::from_response(Some(response)))
    }

    fn cached(&self, key: &CacheKey) -> Option<Outcome> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.get(key)?;

        if entry.at.elapsed() < self.cache_window {
            self.update_stats(|s| s.cache_hits += 1);
            Some(entry.outcome.clone())
        } else {
            None
        }
    }

    fn store(&self, key: CacheKey, outcome: &Outcome) {
        if self.cache_window.is_zero() {
            return;
        }

        if let Ok(mut cache) = self.cache.lock() {
            let window = self.cache_window;
            cache.retain(|_, entry| entry.at.elapsed() < window);
            cache.insert(
                key,
                CacheEntry {
                    outcome: outcome.clone(),
                    at: Instant::now(),
                },
            );
        }
    }

    fn update_stats<F: FnOnce(&mut ExecutorStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }
}
