use crate::connector::ReadBuffer;
use crate::prelude::*;

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// RS-232 link to the inverter: 8N1, no flow control.
///
/// Every I/O failure on a serial line is treated as transient; a cable
/// bump or a USB-serial adapter re-enumerating looks the same from here,
/// and both are fixed by reopening the port.
pub struct SerialConnector {
    port: Option<SerialStream>,
    port_name: Option<String>,
    devices: Vec<String>,
    baud_rate: u32,
    read_timeout: Duration,
    retry: RetryPolicy,
}

impl SerialConnector {
    pub fn new(config: &config::Connector) -> Self {
        Self {
            port: None,
            port_name: None,
            devices: config.devices().to_vec(),
            baud_rate: config.baud_rate(),
            read_timeout: config.read_timeout(),
            retry: config.retry().policy(),
        }
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn open_port(&self, device: &str) -> std::io::Result<SerialStream> {
        let port = tokio_serial::new(device, self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open_native_async()?;

        Ok(port)
    }

    async fn read_once(&mut self, size: usize) -> Result<Vec<u8>, ConnectorError> {
        let read_timeout = self.read_timeout;
        let port = self.port.as_mut().ok_or(ConnectorError::NotOpen)?;

        let mut buf = ReadBuffer::new(size);
        let mut chunk = [0u8; 64];

        while !buf.is_complete() {
            let want = buf.remaining().min(chunk.len());

            match tokio::time::timeout(read_timeout, port.read(&mut chunk[..want])).await {
                Ok(Ok(0)) => {
                    return Err(ConnectorError::Transient(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "serial port closed",
                    )))
                }
                Ok(Ok(n)) => {
                    trace!("serial rx {:?}", &chunk[..n]);
                    buf.extend(&chunk[..n]);
                }
                Ok(Err(e)) => return Err(ConnectorError::Transient(e)),
                Err(_) => {
                    debug!(
                        "no data for {}ms, returning {} of {} bytes",
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
        let port = self.port.as_mut().ok_or(ConnectorError::NotOpen)?;

        trace!("serial tx {:?}", data);
        port.write_all(data).await.map_err(ConnectorError::Transient)?;
        port.flush().await.map_err(ConnectorError::Transient)?;

        Ok(())
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&mut self) -> Result<(), ConnectorError> {
        for device in &self.devices {
            match self.open_port(device) {
                Ok(port) => {
                    info!("serial port {} opened at {} baud", device, self.baud_rate);
                    self.port = Some(port);
                    self.port_name = Some(device.clone());
                    return Ok(());
                }
                Err(e) => warn!("failed to open serial port {}: {}", device, e),
            }
        }

        Err(ConnectorError::NoDevice {
            devices: self.devices.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                warn!("failed to flush before closing (continuing anyway): {}", e);
            }
            let port_name = self.port_name.take().unwrap_or_default();
            info!("serial port {} closed", port_name);
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
        self.port.is_some()
    }
}

impl Drop for SerialConnector {
    fn drop(&mut self) {
        if self.port.is_some() {
            debug!(
                "SerialConnector dropped, closing {}",
                self.port_name.as_deref().unwrap_or_default()
            );
        }
    }
}
