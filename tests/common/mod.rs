#![allow(dead_code)]

pub use axpert_bridge::prelude::*;

use async_trait::async_trait;
use axpert_bridge::connector::ReadBuffer;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct Factory;

impl Factory {
    /// A real QPIGS reply, checksum and NUL padding included.
    pub fn status_response() -> Vec<u8> {
        b"(000.0 00.0 230.0 50.0 0184 0071 003 404 50.10 000 079 0049 0000 000.0 00.00 00001 01010000 00 00 00000 010\x1d\xc2\xb9\r\x00\x00".to_vec()
    }

    pub fn settings_response() -> Vec<u8> {
        b"(230.0 21.7 230.0 50.0 21.7 5000 4000 48.0 46.0 42.0 56.4 54.0 0 10 010 1 0 0 01 0 0 54.0\x6a\x7d\r\x00\x00\x00".to_vec()
    }

    pub fn ack() -> Vec<u8> {
        b"(ACK9 \r".to_vec()
    }

    pub fn nak() -> Vec<u8> {
        b"(NAKss\r".to_vec()
    }

    pub fn battery_mode() -> Vec<u8> {
        b"(B\xe7\xc9\r".to_vec()
    }

    pub fn executor(connector: MockConnector) -> Executor<MockConnector> {
        Executor::with_timeouts(
            Arc::new(Registry::builtin()),
            connector,
            Duration::from_millis(2000),
            Duration::from_millis(2000),
        )
    }
}

// MockConnector {{{
#[derive(Debug, Default)]
pub struct MockState {
    pub writes: Vec<Vec<u8>>,
    pub reads: usize,
    pub opens: usize,
    pub closes: usize,
    pub fail_reads: bool,
    pending: Vec<u8>,
}

/// In-memory inverter. Answers whatever request was written last with the
/// response registered for its command code, or nothing at all.
#[derive(Clone)]
pub struct MockConnector {
    pub state: Arc<Mutex<MockState>>,
    responses: Vec<(Vec<u8>, Vec<u8>)>,
    read_delay: Duration,
    open: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            responses: Vec::new(),
            read_delay: Duration::ZERO,
            open: true,
        }
    }

    pub fn respond(mut self, code: &str, response: Vec<u8>) -> Self {
        self.responses.push((code.as_bytes().to_vec(), response));
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        self.state.lock().unwrap().opens += 1;
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        if self.open {
            self.state.lock().unwrap().closes += 1;
        }
        self.open = false;
        Ok(())
    }

    async fn read(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }

        let request = {
            let mut state = self.state.lock().unwrap();
            state.reads += 1;
            if state.fail_reads {
                return Err(ConnectorError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "mock read failure",
                )));
            }
            std::mem::take(&mut state.pending)
        };

        let mut buf = ReadBuffer::new(size);
        if let Some((_, response)) = self
            .responses
            .iter()
            .find(|(code, _)| request.starts_with(code))
        {
            buf.extend(response);
        }

        Ok(buf.into_vec())
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        let mut state = self.state.lock().unwrap();
        state.writes.push(data.to_vec());
        state.pending.extend_from_slice(data);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
} // }}}
