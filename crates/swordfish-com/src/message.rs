//! Typed message catalog
//!
//! Each message variant owns an opcode constant and a payload schema, and
//! converts to and from the concentrated wire form. The catalog is a
//! closed set: received frames are dispatched through a static opcode
//! table into [`AnyMessage`].

use byteorder::{ByteOrder, LittleEndian};

use crate::error::CommError;
use crate::frame::ConcentratedMessage;

/// A typed protocol message.
///
/// The counter passed to [`Message::to_concentrated`] is transport
/// metadata, not part of message identity:
/// `from_concentrated(m.to_concentrated(c))` equals `m` for every `c`.
pub trait Message: Sized {
    /// Opcode identifying this message type on the wire
    const OPCODE: u8;

    /// Serialize the message fields into payload bytes per the schema
    fn payload(&self) -> Vec<u8>;

    /// Parse the message fields from payload bytes.
    ///
    /// Fails with [`CommError::PayloadSchemaError`] when the payload does
    /// not match the schema.
    fn from_payload(payload: &[u8]) -> Result<Self, CommError>;

    /// Human-readable rendering of the message, for logging and
    /// diagnostics only.
    fn describe(&self) -> String;

    /// Wrap the message into its concentrated wire form
    fn to_concentrated(&self, counter: u16) -> Result<ConcentratedMessage, CommError> {
        ConcentratedMessage::new(counter, Self::OPCODE, self.payload())
    }

    /// Reconstruct the message from a concentrated frame.
    ///
    /// Fails with [`CommError::OpcodeMismatch`] when the frame carries a
    /// different opcode.
    fn from_concentrated(msg: &ConcentratedMessage) -> Result<Self, CommError> {
        if msg.opcode() != Self::OPCODE {
            return Err(CommError::OpcodeMismatch {
                expected: Self::OPCODE,
                actual: msg.opcode(),
            });
        }
        Self::from_payload(msg.payload())
    }
}

/// Ping request; the device bounces it straight back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ping;

impl Message for Ping {
    const OPCODE: u8 = 0;

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }

    fn from_payload(payload: &[u8]) -> Result<Self, CommError> {
        if !payload.is_empty() {
            return Err(CommError::PayloadSchemaError(format!(
                "ping carries no payload, got {} bytes",
                payload.len()
            )));
        }
        Ok(Ping)
    }

    fn describe(&self) -> String {
        "Ping".to_string()
    }
}

/// Firmware identification report (version, MCU type and board UUID)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionData {
    /// Major firmware version
    pub version: u8,
    /// Minor firmware version
    pub subversion: u8,
    /// MCU family identifier
    pub mcu_type: u32,
    /// Unique board identifier
    pub uuid: [u8; 8],
}

/// version + subversion + mcu_type + uuid
const VERSION_DATA_LEN: usize = 1 + 1 + 4 + 8;

impl Message for VersionData {
    const OPCODE: u8 = 2;

    fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(VERSION_DATA_LEN);
        payload.push(self.version);
        payload.push(self.subversion);
        let mut mcu_bytes = [0u8; 4];
        LittleEndian::write_u32(&mut mcu_bytes, self.mcu_type);
        payload.extend_from_slice(&mcu_bytes);
        payload.extend_from_slice(&self.uuid);
        payload
    }

    fn from_payload(payload: &[u8]) -> Result<Self, CommError> {
        if payload.len() != VERSION_DATA_LEN {
            return Err(CommError::PayloadSchemaError(format!(
                "version data expects {} bytes, got {}",
                VERSION_DATA_LEN,
                payload.len()
            )));
        }
        let mut uuid = [0u8; 8];
        uuid.copy_from_slice(&payload[6..14]);
        Ok(Self {
            version: payload[0],
            subversion: payload[1],
            mcu_type: LittleEndian::read_u32(&payload[2..6]),
            uuid,
        })
    }

    fn describe(&self) -> String {
        format!(
            "VersionData {{ version: {}.{}, mcu_type: {:#010x}, uuid: {:02x?} }}",
            self.version, self.subversion, self.mcu_type, self.uuid
        )
    }
}

/// Any message the catalog knows how to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyMessage {
    /// Ping bounce
    Ping(Ping),
    /// Firmware identification
    VersionData(VersionData),
}

impl AnyMessage {
    /// Opcode of the contained message
    pub fn opcode(&self) -> u8 {
        match self {
            AnyMessage::Ping(_) => Ping::OPCODE,
            AnyMessage::VersionData(_) => VersionData::OPCODE,
        }
    }

    /// Human-readable rendering of the contained message
    pub fn describe(&self) -> String {
        match self {
            AnyMessage::Ping(m) => m.describe(),
            AnyMessage::VersionData(m) => m.describe(),
        }
    }
}

type Decoder = fn(&ConcentratedMessage) -> Result<AnyMessage, CommError>;

/// Opcode dispatch table for received frames
const DECODERS: &[(u8, Decoder)] = &[
    (Ping::OPCODE, |m| {
        Ping::from_concentrated(m).map(AnyMessage::Ping)
    }),
    (VersionData::OPCODE, |m| {
        VersionData::from_concentrated(m).map(AnyMessage::VersionData)
    }),
];

/// Decode a received frame into a typed message via the opcode table.
///
/// Fails with [`CommError::UnknownOpcode`] for opcodes not in the catalog.
pub fn decode_message(msg: &ConcentratedMessage) -> Result<AnyMessage, CommError> {
    let decoder = DECODERS
        .iter()
        .find(|(opcode, _)| *opcode == msg.opcode())
        .map(|(_, decoder)| decoder)
        .ok_or(CommError::UnknownOpcode(msg.opcode()))?;
    decoder(msg)
}
