use std::fmt;
use std::io;

use thiserror::Error;

use super::frame::Tag;
use super::host::Host;
use crate::id::Id;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("try again")]
    TryAgain,

    #[error("all {0} buffers are in use")]
    PoolExhausted(&'static str),

    #[error("{0} queue is full")]
    QueueFull(&'static str),

    #[error("payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("host {host} is not compatible with interface {interface}")]
    NotCompatible { host: Host, interface: Host },

    #[error("host {0} has no usable address")]
    Unaddressable(Host),

    #[error("stale or unknown handle")]
    InvalidHandle,

    #[error("invalid host: {0}")]
    Host(#[from] HostParseError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostParseError {
    #[error("unknown transport protocol: {0:?}")]
    UnknownTransport(String),

    #[error("invalid {internet} address: {text:?}")]
    InvalidAddress { internet: &'static str, text: String },

    #[error("invalid port: {0:?}")]
    InvalidPort(String),

    #[error("unexpected trailing input: {0:?}")]
    TrailingInput(String),

    #[error("unknown protocol byte {0:#04x}")]
    UnknownProtocol(u8),

    #[error("truncated host encoding")]
    Truncated,
}

/// Classification of a failed send or receive, carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Io(io::ErrorKind),
    Timeout,
    NotCompatible,
    Closed,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Io(kind) => write!(f, "{}", kind),
            Failure::Timeout => f.write_str("timed out"),
            Failure::NotCompatible => f.write_str("not compatible"),
            Failure::Closed => f.write_str("connection closed"),
        }
    }
}

impl From<&io::Error> for Failure {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => Failure::Timeout,
            kind => Failure::Io(kind),
        }
    }
}

impl From<&NetError> for Failure {
    fn from(err: &NetError) -> Self {
        match err {
            NetError::Io(e) => Failure::from(e),
            NetError::NotCompatible { .. } => Failure::NotCompatible,
            NetError::Unaddressable(_) | NetError::Host(_) => Failure::Io(io::ErrorKind::InvalidInput),
            _ => Failure::Io(io::ErrorKind::Other),
        }
    }
}

/// Context of a failed send or receive, as handed to a [`FailureSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureReport {
    pub nonce: Option<Id>,
    pub host: Host,
    pub tag: Tag,
    pub failure: Failure,
}

/// Where the sender and receiver deliver failures they cannot retry.
pub trait FailureSink {
    fn report(&self, report: FailureReport);
}
