use crate::connector::ReadBuffer;
use crate::prelude::*;

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::time::Duration;
use tokio::io::unix::AsyncFd;

/// Size of one HID input report.
pub const REPORT_SIZE: usize = 8;

// linux errno values for a hidraw node whose device went away
const ENXIO: i32 = 6;
const EBADF: i32 = 9;
const ENODEV: i32 = 19;

// linux open(2) flag
const O_NONBLOCK: i32 = 0o4000;

/// USB-HID link through a hidraw node (`/dev/hidraw*`).
///
/// The node is opened non-blocking and driven through the reactor, so a
/// read that times out leaves nothing pending on the descriptor.
///
/// Only a "device not open" failure is retried; anything else is a real
/// error and goes straight back to the caller.
pub struct UsbHidConnector {
    dev: Option<AsyncFd<File>>,
    path: Option<String>,
    devices: Vec<String>,
    read_timeout: Duration,
    retry: RetryPolicy,
    open_attempts: u32,
}

impl UsbHidConnector {
    pub fn new(config: &config::Connector) -> Self {
        Self {
            dev: None,
            path: None,
            devices: config.devices().to_vec(),
            read_timeout: config.read_timeout(),
            retry: config.retry().policy(),
            open_attempts: 0,
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Calls to `open`, including the ones made by the retry policy.
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts
    }

    fn open_device(device: &str) -> std::io::Result<AsyncFd<File>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_NONBLOCK)
            .open(device)?;

        AsyncFd::new(file)
    }

    async fn read_once(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError> {
        let read_timeout = self.read_timeout;
        let dev = self.dev.as_ref().ok_or(ConnectorError::NotOpen)?;

        let mut buf = ReadBuffer::new(size);
        let mut report = [0u8; REPORT_SIZE];

        while !buf.is_complete() {
            match tokio::time::timeout(read_timeout, read_report(dev, &mut report)).await {
                // nothing more queued
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    trace!("hid rx {:?}", &report[..n]);
                    buf.extend(&report[..n]);
                }
                Ok(Err(e)) => return Err(classify(e)),
                Err(_) => {
                    debug!(
                        "no report for {}ms, returning {} of {} bytes",
                        read_timeout.as_millis(),
                        buf.len(),
                        size
                    );
                    break;
                }
            }
        }

        Ok(buf.into_vec())
    }

    async fn write_once(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        let dev = self.dev.as_ref().ok_or(ConnectorError::NotOpen)?;

        trace!("hid tx {:?}", data);
        write_report(dev, data).await.map_err(classify)
    }
}

async fn read_report(dev: &AsyncFd<File>, report: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let mut guard = dev.readable().await?;
        match guard.try_io(|inner| inner.get_ref().read(report)) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

async fn write_report(dev: &AsyncFd<File>, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        let mut guard = dev.writable().await?;
        match guard.try_io(|inner| inner.get_ref().write(data)) {
            Ok(Ok(0)) => return Err(ErrorKind::WriteZero.into()),
            Ok(Ok(n)) => data = &data[n..],
            Ok(Err(e)) => return Err(e),
            Err(_would_block) => continue,
        }
    }

    Ok(())
}

/// Splits I/O errors into "device not open" (worth a reopen) and the rest.
pub fn classify(e: std::io::Error) -> ConnectorError {
    let not_open = matches!(e.kind(), ErrorKind::NotConnected | ErrorKind::BrokenPipe)
        || matches!(e.raw_os_error(), Some(ENXIO | EBADF | ENODEV));

    if not_open {
        ConnectorError::Transient(e)
    } else {
        ConnectorError::Io(e)
    }
}

#[async_trait]
impl Connector for UsbHidConnector {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        self.open_attempts += 1;

        for device in &self.devices {
            match Self::open_device(device) {
                Ok(dev) => {
                    info!("hid device {} opened", device);
                    self.dev = Some(dev);
                    self.path = Some(device.clone());
                    return Ok(());
                }
                Err(e) => warn!("failed to open hid device {}: {}", device, e),
            }
        }

        Err(ConnectorError::NoDevice {
            devices: self.devices.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        if self.dev.take().is_some() {
            let path = self.path.take().unwrap_or_default();
            info!("hid device {} closed", path);
        }

        Ok(())
    }

    async fn read(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError> {
        let retry = self.retry;
        retry.run(self, move |c| Box::pin(c.read_once(size))).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ConnectorError> {
        let retry = self.retry;
        let data = data.to_vec();
        retry
            .run(self, move |c| {
                let data = data.clone();
                Box::pin(async move { c.write_once(&data).await })
            })
            .await
    }

    fn is_open(&self) -> bool {
        self.dev.is_some()
    }
}
