// error.rs
use std::{error::Error, fmt};

const ERR_MSG_QUEUE_FULL: &str = "port queue is full";
const ERR_MSG_PORT_CLOSED: &str = "port is closed";
const ERR_MSG_TIMEOUT: &str = "operation timed out";
const ERR_MSG_CANCELLED: &str = "operation cancelled";

/// Why a configuration document was refused at the apply point.
/// The previous program keeps running in every case.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// A required top-level key is missing or has the wrong shape.
    Structure(String),
    /// A wire node references a variable name absent from the store.
    UnknownVariable(String),
    /// A variable binds a pin name absent from the device descriptor.
    UnknownPin(String),
    /// A variable entry could not be materialized.
    Variable(String),
    /// The document exceeds the wire-count cap.
    TooManyWires { found: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Structure(what) => write!(f, "invalid document structure: {what}"),
            ConfigError::UnknownVariable(name) => {
                write!(f, "wire references unknown variable '{name}'")
            }
            ConfigError::UnknownPin(name) => write!(f, "unknown pin name '{name}'"),
            ConfigError::Variable(what) => write!(f, "invalid variable entry: {what}"),
            ConfigError::TooManyWires { found, max } => {
                write!(f, "document has {found} wires, cap is {max}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Driver-layer failure. Operators treat the sentinel value as data;
/// this type only surfaces in logs and setter results.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DriverError {
    PinNotFound(String),
    SensorNotSupported(String),
    Io(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::PinNotFound(name) => write!(f, "pin '{name}' not found"),
            DriverError::SensorNotSupported(kind) => {
                write!(f, "sensor type '{kind}' not supported")
            }
            DriverError::Io(msg) => write!(f, "driver io error: {msg}"),
        }
    }
}

impl Error for DriverError {}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendFailReason {
    Timeout,
    Cancelled,
    Full,
    Closed,
}

impl fmt::Display for SendFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailReason::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            SendFailReason::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
            SendFailReason::Full => write!(f, "{ERR_MSG_QUEUE_FULL}"),
            SendFailReason::Closed => write!(f, "{ERR_MSG_PORT_CLOSED}"),
        }
    }
}

#[derive(Debug)]
pub struct SendError<T> {
    pub value: Option<T>,
    pub reason: SendFailReason,
}

impl<T> SendError<T> {
    pub fn full(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Full,
        }
    }

    pub fn closed(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Closed,
        }
    }

    pub fn cancelled(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Cancelled,
        }
    }

    pub fn timeout(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Timeout,
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl<T: fmt::Debug> Error for SendError<T> {}

#[derive(Debug)]
pub enum TryRecvError {
    Empty,
    Disconnected,
}

#[derive(Debug)]
pub enum RecvError {
    Timeout,
    Disconnected,
    Cancelled,
}

impl Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            RecvError::Disconnected => write!(f, "{ERR_MSG_PORT_CLOSED}"),
            RecvError::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
        }
    }
}
