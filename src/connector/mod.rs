//! The physical link to the inverter.
//!
//! A [`Connector`] owns a single device handle. It is opened once, used for
//! any number of request/response exchanges by whoever holds it exclusively
//! (the [`Executor`](crate::executor::Executor)), then closed. Both variants
//! recover from transient faults with the same [`RetryPolicy`].

pub mod retry;
pub mod serial;
pub mod usbhid;

pub use retry::RetryPolicy;
pub use serial::SerialConnector;
pub use usbhid::UsbHidConnector;

use crate::axpert::packet::TERMINATOR;
use crate::prelude::*;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use serde::Deserialize;

#[async_trait]
pub trait Connector: Send {
    /// Tries each candidate device in order and keeps the first that opens.
    async fn open(&mut self) -> Result<(), ConnectorError>;

    /// Releases the handle. Closing a closed connector is a no-op.
    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Reads until `size` bytes arrived or a `\r` was seen. NUL padding is
    /// dropped. May return fewer than `size` bytes if the device goes quiet.
    async fn read(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError>;

    fn is_open(&self) -> bool;

    /// Writes a frame in the chunks the inverter can swallow.
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), ConnectorError> {
        for chunk in frame.chunks() {
            self.write(chunk).await?;
        }
        Ok(())
    }

    async fn reopen(&mut self) -> Result<(), ConnectorError> {
        if let Err(e) = self.close().await {
            debug!("ignoring close error before reopen: {}", e);
        }
        self.open().await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ConnectorKind {
    #[serde(rename = "serial")]
    Serial,
    #[serde(rename = "usb", alias = "usbhid")]
    UsbHid,
}

// ReadBuffer {{{
/// Accumulates a response across however many low-level reads it takes.
#[derive(Debug)]
pub struct ReadBuffer {
    buf: BytesMut,
    size: usize,
    terminated: bool,
}

impl ReadBuffer {
    pub fn new(size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(size),
            size,
            terminated: false,
        }
    }

    /// Appends a chunk, returning true once the response is complete.
    /// Anything after the terminator is discarded.
    pub fn extend(&mut self, chunk: &[u8]) -> bool {
        for &byte in chunk {
            if self.is_complete() {
                break;
            }
            if byte == 0 {
                continue;
            }

            self.buf.put_u8(byte);
            if byte == TERMINATOR {
                self.terminated = true;
            }
        }

        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.terminated || self.buf.len() >= self.size
    }

    /// How many more bytes may be read without overshooting `size`.
    pub fn remaining(&self) -> usize {
        self.size.saturating_sub(self.buf.len())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
} // }}}

// DeviceConnector {{{
/// The connector selected by configuration.
pub enum DeviceConnector {
    Serial(SerialConnector),
    UsbHid(UsbHidConnector),
}

impl DeviceConnector {
    pub fn from_config(config: &config::Connector) -> Self {
        match config.kind() {
            ConnectorKind::Serial => Self::Serial(SerialConnector::new(config)),
            ConnectorKind::UsbHid => Self::UsbHid(UsbHidConnector::new(config)),
        }
    }

    pub fn kind(&self) -> ConnectorKind {
        match self {
            Self::Serial(_) => ConnectorKind::Serial,
            Self::UsbHid(_) => ConnectorKind::UsbHid,
        }
    }
}

#[async_trait]
impl Connector for DeviceConnector {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        match self {
            Self::Serial(c) => c.open().await,
            Self::UsbHid(c) => c.open().await,
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        match self {
            Self::Serial(c) => c.close().await,
            Self::UsbHid(c) => c.close().await,
        }
    }

    async fn read(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError> {
        match self {
            Self::Serial(c) => c.read(size).await,
            Self::UsbHid(c) => c.read(size).await,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        match self {
            Self::Serial(c) => c.write(data).await,
            Self::UsbHid(c) => c.write(data).await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Serial(c) => c.is_open(),
            Self::UsbHid(c) => c.is_open(),
        }
    }
} // }}}
