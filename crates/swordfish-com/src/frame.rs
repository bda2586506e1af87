//! Concentrated message codec
//!
//! The "concentrated" form is the flat wire representation of any typed
//! message, so the transport never has to understand message semantics.
//!
//! Frame format (all multi-byte fields little-endian):
//! - 4 bytes: sync word (0xefbeadde, on the wire `de ad be ef`)
//! - 2 bytes: counter
//! - 1 byte:  opcode
//! - 2 bytes: payload length (max 245)
//! - N bytes: payload
//! - 1 byte:  checksum (wrapping byte sum of everything before it)

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use crate::error::CommError;

/// Frame sync word; encodes to `de ad be ef` on the wire
pub const SYNC_WORD: u32 = 0xefbeadde;

/// Wire bytes of the sync word
const SYNC_BYTES: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

/// Fixed header size: sync word + counter + opcode + payload length
pub const HEADER_LEN: usize = 9;

/// Maximum payload size in a single frame
pub const MAX_PAYLOAD_LEN: usize = 245;

/// Maximum total frame size (header + payload + checksum)
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + 1;

/// A single protocol frame: counter, opcode and opaque payload.
///
/// Immutable once constructed; the codec guarantees
/// `from_bytes(m.to_bytes()) == m`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcentratedMessage {
    counter: u16,
    opcode: u8,
    payload: Vec<u8>,
}

impl ConcentratedMessage {
    /// Create a new message. Fails if the payload exceeds
    /// [`MAX_PAYLOAD_LEN`].
    pub fn new(
        counter: u16,
        opcode: u8,
        payload: impl Into<Vec<u8>>,
    ) -> Result<Self, CommError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(CommError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self {
            counter,
            opcode,
            payload,
        })
    }

    /// Sequence counter assigned when the message was transmitted
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Semantic type tag of the message
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    /// Opcode-defined payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Encode the message to wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.payload.len() + 1);

        bytes.extend_from_slice(&SYNC_BYTES);

        let mut counter_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut counter_bytes, self.counter);
        bytes.extend_from_slice(&counter_bytes);

        bytes.push(self.opcode);

        let mut len_bytes = [0u8; 2];
        LittleEndian::write_u16(&mut len_bytes, self.payload.len() as u16);
        bytes.extend_from_slice(&len_bytes);

        bytes.extend_from_slice(&self.payload);
        bytes.push(wrapping_sum(&bytes));

        bytes
    }

    /// Decode a message from exactly one wire frame.
    ///
    /// Fails with [`CommError::MalformedFrame`] when the buffer is shorter
    /// than the header, the sync word is wrong, the declared payload
    /// length disagrees with the buffer size, or the checksum does not
    /// verify.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommError> {
        if data.len() < HEADER_LEN + 1 {
            return Err(CommError::MalformedFrame(format!(
                "buffer of {} bytes is shorter than a minimal frame",
                data.len()
            )));
        }
        if data[..4] != SYNC_BYTES {
            return Err(CommError::MalformedFrame(format!(
                "bad sync word {:02x?}",
                &data[..4]
            )));
        }

        let length = LittleEndian::read_u16(&data[7..9]) as usize;
        if length > MAX_PAYLOAD_LEN {
            return Err(CommError::MalformedFrame(format!(
                "declared payload length {length} exceeds maximum {MAX_PAYLOAD_LEN}"
            )));
        }
        if data.len() != HEADER_LEN + length + 1 {
            return Err(CommError::MalformedFrame(format!(
                "declared payload length {} does not match buffer size {}",
                length,
                data.len()
            )));
        }

        let expected = wrapping_sum(&data[..data.len() - 1]);
        let actual = data[data.len() - 1];
        if expected != actual {
            return Err(CommError::MalformedFrame(format!(
                "checksum mismatch: expected {expected:#04x}, got {actual:#04x}"
            )));
        }

        Ok(Self {
            counter: LittleEndian::read_u16(&data[4..6]),
            opcode: data[6],
            payload: data[HEADER_LEN..HEADER_LEN + length].to_vec(),
        })
    }

    /// Total encoded size of this message
    pub fn encoded_size(&self) -> usize {
        HEADER_LEN + self.payload.len() + 1
    }
}

/// Wrapping byte sum used as the frame integrity field
fn wrapping_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Reassembles frames from the byte chunks a serial read produces.
///
/// Serial reads return arbitrary slices of the stream, so the accumulator
/// buffers incoming bytes, scans for the sync word, and emits complete
/// frames as they become available. Garbage before a sync word is skipped;
/// a frame that fails validation is discarded so the stream resynchronizes
/// at the next sync word.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
}

/// Accumulator capacity bound; oldest bytes are dropped beyond this
const ACCUM_CAPACITY: usize = 3 * MAX_FRAME_LEN;

impl FrameAccumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes read from the transport.
    ///
    /// The internal buffer is bounded; if unparseable data piles up past
    /// the capacity, the oldest bytes are dropped.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if self.buf.len() > ACCUM_CAPACITY {
            let excess = self.buf.len() - ACCUM_CAPACITY;
            warn!("accumulator overflow, dropping {excess} oldest bytes");
            self.buf.drain(..excess);
        }
    }

    /// Number of buffered bytes not yet consumed by a frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Try to extract the next complete frame.
    ///
    /// Returns `Ok(Some(msg))` when a valid frame was consumed,
    /// `Ok(None)` when more bytes are needed, and
    /// `Err(MalformedFrame)` when a sync-aligned frame failed validation
    /// (the offending bytes are discarded).
    pub fn pop_frame(&mut self) -> Result<Option<ConcentratedMessage>, CommError> {
        // Skip garbage before the sync word
        let start = match self
            .buf
            .windows(SYNC_BYTES.len())
            .position(|w| w == SYNC_BYTES)
        {
            Some(pos) => pos,
            None => {
                // Keep a tail that could be a partial sync word
                if self.buf.len() > SYNC_BYTES.len() - 1 {
                    let drop_len = self.buf.len() - (SYNC_BYTES.len() - 1);
                    self.buf.drain(..drop_len);
                }
                return Ok(None);
            }
        };
        if start > 0 {
            warn!("skipping {start} bytes of garbage before sync word");
            self.buf.drain(..start);
        }

        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let length = LittleEndian::read_u16(&self.buf[7..9]) as usize;
        if length > MAX_PAYLOAD_LEN {
            // Skip this sync word so the scan can resynchronize
            self.buf.drain(..SYNC_BYTES.len());
            return Err(CommError::MalformedFrame(format!(
                "declared payload length {length} exceeds maximum {MAX_PAYLOAD_LEN}"
            )));
        }

        let frame_len = HEADER_LEN + length + 1;
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        let result = ConcentratedMessage::from_bytes(&self.buf[..frame_len]);
        match result {
            Ok(msg) => {
                self.buf.drain(..frame_len);
                Ok(Some(msg))
            }
            Err(e) => {
                self.buf.drain(..SYNC_BYTES.len());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_roundtrip() {
        let original = ConcentratedMessage::new(0, 2, vec![1, 2, 3, 5, 6]).unwrap();
        let encoded = original.to_bytes();
        let decoded = ConcentratedMessage::from_bytes(&encoded).expect("should decode");

        assert_eq!(original, decoded);
        assert_eq!(decoded.counter(), 0);
        assert_eq!(decoded.opcode(), 2);
        assert_eq!(decoded.payload(), &[1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let original = ConcentratedMessage::new(42, 0, Vec::new()).unwrap();
        let encoded = original.to_bytes();
        assert_eq!(encoded.len(), HEADER_LEN + 1);
        let decoded = ConcentratedMessage::from_bytes(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_wire_layout() {
        let msg = ConcentratedMessage::new(0x0201, 7, vec![0xAA]).unwrap();
        let bytes = msg.to_bytes();
        assert_eq!(&bytes[..4], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(&bytes[4..6], &[0x01, 0x02]); // counter LE
        assert_eq!(bytes[6], 7); // opcode
        assert_eq!(&bytes[7..9], &[0x01, 0x00]); // length LE
        assert_eq!(bytes[9], 0xAA);
    }

    #[test]
    fn test_payload_too_large() {
        let err = ConcentratedMessage::new(0, 0, vec![0u8; MAX_PAYLOAD_LEN + 1]).unwrap_err();
        assert!(matches!(
            err,
            CommError::PayloadTooLarge { len, max } if len == MAX_PAYLOAD_LEN + 1 && max == MAX_PAYLOAD_LEN
        ));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = ConcentratedMessage::from_bytes(&[0xde, 0xad, 0xbe]).unwrap_err();
        assert!(matches!(err, CommError::MalformedFrame(_)));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let msg = ConcentratedMessage::new(1, 1, vec![9, 9, 9]).unwrap();
        let mut encoded = msg.to_bytes();
        // Truncate one payload byte: declared length no longer matches
        encoded.remove(encoded.len() - 2);
        let err = ConcentratedMessage::from_bytes(&encoded).unwrap_err();
        assert!(matches!(err, CommError::MalformedFrame(_)));
    }

    #[test]
    fn test_checksum_corruption_rejected() {
        let msg = ConcentratedMessage::new(3, 4, vec![1, 2, 3, 4, 5]).unwrap();
        let mut encoded = msg.to_bytes();
        let idx = HEADER_LEN + 2;
        encoded[idx] ^= 0xFF;
        let err = ConcentratedMessage::from_bytes(&encoded).unwrap_err();
        assert!(matches!(err, CommError::MalformedFrame(_)));
    }

    #[test]
    fn test_accumulator_reassembles_split_frame() {
        let msg = ConcentratedMessage::new(9, 2, vec![10, 20, 30]).unwrap();
        let encoded = msg.to_bytes();

        let mut accum = FrameAccumulator::new();
        // Feed one byte at a time
        for byte in &encoded[..encoded.len() - 1] {
            accum.extend(&[*byte]);
            assert_eq!(accum.pop_frame().unwrap(), None);
        }
        accum.extend(&encoded[encoded.len() - 1..]);
        let decoded = accum.pop_frame().unwrap().expect("complete frame");
        assert_eq!(decoded, msg);
        assert_eq!(accum.pending(), 0);
    }

    #[test]
    fn test_accumulator_skips_leading_garbage() {
        let msg = ConcentratedMessage::new(1, 0, Vec::new()).unwrap();
        let mut stream = vec![0x00, 0x11, 0x22, 0xde, 0xad]; // noise + partial sync
        stream.extend_from_slice(&msg.to_bytes());

        let mut accum = FrameAccumulator::new();
        accum.extend(&stream);
        let decoded = accum.pop_frame().unwrap().expect("frame after garbage");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_accumulator_two_frames_in_one_chunk() {
        let first = ConcentratedMessage::new(1, 0, Vec::new()).unwrap();
        let second = ConcentratedMessage::new(2, 2, vec![7, 8]).unwrap();
        let mut stream = first.to_bytes();
        stream.extend_from_slice(&second.to_bytes());

        let mut accum = FrameAccumulator::new();
        accum.extend(&stream);
        assert_eq!(accum.pop_frame().unwrap().unwrap(), first);
        assert_eq!(accum.pop_frame().unwrap().unwrap(), second);
        assert_eq!(accum.pop_frame().unwrap(), None);
    }

    #[test]
    fn test_accumulator_resynchronizes_after_bad_frame() {
        let good = ConcentratedMessage::new(5, 2, vec![1]).unwrap();
        let mut bad = good.to_bytes();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF; // corrupt checksum

        let mut stream = bad;
        stream.extend_from_slice(&good.to_bytes());

        let mut accum = FrameAccumulator::new();
        accum.extend(&stream);
        assert!(accum.pop_frame().is_err());
        let decoded = accum.pop_frame().unwrap().expect("good frame after bad");
        assert_eq!(decoded, good);
    }

    #[test]
    fn test_accumulator_bounded() {
        let mut accum = FrameAccumulator::new();
        accum.extend(&vec![0u8; ACCUM_CAPACITY * 2]);
        assert!(accum.pending() <= ACCUM_CAPACITY);
        // Still usable afterwards
        let msg = ConcentratedMessage::new(0, 0, Vec::new()).unwrap();
        accum.extend(&msg.to_bytes());
        // Drain the zero noise, then the frame decodes
        let decoded = accum.pop_frame().unwrap().expect("frame after overflow");
        assert_eq!(decoded, msg);
    }
}
