pub use anyhow::{anyhow, bail, Error, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::str::FromStr;

pub use crate::axpert;
pub use crate::axpert::decoder::{Decode, Decoder, Record};
pub use crate::axpert::packet::{Frame, Outcome, Status};
pub use crate::command::{CommandSpec, Registry};
pub use crate::config::{self, Config};
pub use crate::connector::{self, Connector, ConnectorKind, DeviceConnector, RetryPolicy};
pub use crate::error::ConnectorError;
pub use crate::executor::{Executor, ExecutorStats};
pub use crate::file_error;
