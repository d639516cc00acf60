/// Creates an anyhow error with the current file and line number
#[macro_export]
macro_rules! file_error {
    ($($arg:tt)*) => {
        anyhow::anyhow!(
            "[{}:{}] {}",
            std::path::Path::new(file!())
                .file_name()
                .map(|f| f.to_string_lossy())
                .unwrap_or_default(),
            line!(),
            format!($($arg)*)
        )
    };
}

/// Errors raised by a [`Connector`](crate::connector::Connector).
///
/// The variants carry enough information for [`RetryPolicy`](crate::connector::RetryPolicy)
/// to decide whether a failure is worth another attempt. Everything above the
/// connector layer works with `anyhow::Result` and sees these through `?`.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// None of the candidate device paths could be opened.
    #[error("could not open any of the devices: {}", .devices.join(", "))]
    NoDevice { devices: Vec<String> },

    /// read/write attempted while the handle is closed.
    #[error("device is not open")]
    NotOpen,

    /// A failure the retry policy may recover from by reopening the device.
    #[error("transient I/O error: {0}")]
    Transient(#[source] std::io::Error),

    /// Any other I/O failure. Never retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The retry budget was spent without a successful operation.
    #[error("connection lost after {attempts} retries: {source}")]
    ConnectionLost {
        attempts: u32,
        #[source]
        source: Box<ConnectorError>,
    },
}

impl ConnectorError {
    /// Whether the retry policy should reopen the device and try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::NotOpen)
    }
}
