//! Error kinds surfaced across device crate boundaries.
//!
//! Kernel ioctl failures and parse errors keep propagating as
//! `anyhow::Error` with `.context(...)`, the same way the `fe`/`dmx`
//! modules already do; `GatewayError` exists for the handful of outcomes a
//! caller (the enumerator, a session handler) needs to branch on by kind
//! rather than just log and give up.

use thiserror::Error;

use crate::device_data::DeliverySystemId;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no frontend device at adapter {adapter}, frontend {frontend}")]
    NoSuchFrontend { adapter: u32, frontend: u32 },

    #[error("frontend is already claimed by another session")]
    AlreadyClaimed,

    #[error("device does not support delivery system {0}")]
    UnsupportedDeliverySystem(DeliverySystemId),

    #[error("tuner did not lock within the timeout")]
    LockTimeout,

    #[error("malformed stream parameter: {0}")]
    BadParameter(String),

    #[error("child process source exited: {0}")]
    ChildProcessExited(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
