//! Communication errors

use thiserror::Error;

/// Errors that can occur during SwordFish communication
#[derive(Error, Debug)]
pub enum CommError {
    #[error("Serial port unavailable: {0}")]
    PortUnavailable(String),

    #[error("No complete frame received within the deadline")]
    Timeout,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Opcode mismatch: expected {expected}, got {actual}")]
    OpcodeMismatch { expected: u8, actual: u8 },

    #[error("Unknown opcode: {0}")]
    UnknownOpcode(u8),

    #[error("Payload schema error: {0}")]
    PayloadSchemaError(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
