use crate::prelude::*;

use futures::future::BoxFuture;
use std::time::Duration;

/// Bounded retry-with-backoff shared by every connector.
///
/// A transient failure sleeps, reopens the device and tries again. After
/// `max_retries` retries the last error is wrapped in
/// [`ConnectorError::ConnectionLost`] and handed back to the caller; it is up
/// to whoever supervises the process to decide whether that is fatal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        config::Retry::default().policy()
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: 1.0,
            max_delay: delay,
        }
    }

    pub fn with_backoff(mut self, backoff: f64, max_delay: Duration) -> Self {
        self.backoff = backoff.max(1.0);
        self.max_delay = max_delay.max(self.delay);
        self
    }

    /// Sleep before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff.powi(attempt.min(i32::MAX as u32) as i32);

        Duration::try_from_secs_f64(self.delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    pub async fn run<C, T, F>(&self, connector: &mut C, mut op: F) -> Result<T, ConnectorError>
    where
        C: Connector,
        F: for<'a> FnMut(&'a mut C) -> BoxFuture<'a, Result<T, ConnectorError>>,
    {
        let mut retries = 0;

        loop {
            let err = match op(&mut *connector).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            if retries >= self.max_retries {
                error!("giving up after {} retries: {}", retries, err);
                return Err(ConnectorError::ConnectionLost {
                    attempts: retries,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(retries);
            retries += 1;
            warn!(
                "{}, reconnecting in {}ms (retry {}/{})",
                err,
                delay.as_millis(),
                retries,
                self.max_retries
            );
            tokio::time::sleep(delay).await;

            if let Err(e) = connector.reopen().await {
                warn!("reconnect failed: {}", e);
            }
        }
    }
}
