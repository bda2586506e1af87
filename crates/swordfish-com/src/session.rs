//! Communication session
//!
//! A [`Session`] owns one open transport and its transmit/receive
//! counters, and runs a strictly synchronous request/response exchange:
//! one outstanding `send` at a time, blocking until a reply frame decodes
//! or the deadline passes. Correlating the reply's counter and opcode
//! against the request is the caller's job; the session never reorders,
//! buffers, or retries.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::discovery::{clear_buffers, configure_port, open_port};
use crate::error::CommError;
use crate::frame::{ConcentratedMessage, FrameAccumulator, MAX_FRAME_LEN};
use crate::transport::{SerialTransport, Transport};
use crate::{DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Poll interval while waiting for reply bytes
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Transport open, send/receive cycles allowed
    Open,
    /// Transport released; further sends fail
    Closed,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Reply deadline in milliseconds
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    /// Configuration for the given port with default baud rate and timeout
    pub fn for_port(name: &str) -> Self {
        Self {
            port_name: name.to_string(),
            ..Self::default()
        }
    }
}

/// A stateful request/response session over one transport
pub struct Session {
    /// Transport handle; `None` once closed
    transport: Option<Box<dyn Transport>>,
    /// Current lifecycle state
    state: SessionState,
    /// Session configuration
    config: SessionConfig,
    /// Reassembles reply frames from raw read chunks
    accumulator: FrameAccumulator,
    /// Messages successfully transmitted in this session
    tx_counter: u64,
    /// Frames successfully received and decoded in this session
    rx_counter: u64,
}

impl Session {
    /// Open a session on the configured serial port.
    ///
    /// Fails with [`CommError::PortUnavailable`] when the port cannot be
    /// opened (busy, missing, permission denied).
    pub fn open(config: SessionConfig) -> Result<Self, CommError> {
        let mut port = open_port(&config.port_name, Some(config.baud_rate))?;
        configure_port(port.as_mut())?;
        clear_buffers(port.as_mut())?;
        debug!(port = %config.port_name, baud = config.baud_rate, "session opened");
        Ok(Self::from_transport(
            Box::new(SerialTransport::new(port)),
            config,
        ))
    }

    /// Build a session over an already-open transport.
    ///
    /// Useful for non-serial channels and for testing against an
    /// in-memory transport.
    pub fn from_transport(transport: Box<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            state: SessionState::Open,
            config,
            accumulator: FrameAccumulator::new(),
            tx_counter: 0,
            rx_counter: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session can still send
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Messages successfully transmitted in this session
    pub fn tx_counter(&self) -> u64 {
        self.tx_counter
    }

    /// Frames successfully received and decoded in this session
    pub fn rx_counter(&self) -> u64 {
        self.rx_counter
    }

    /// Send a message and block until a reply frame arrives.
    ///
    /// `tx_counter` increments once the message is written;
    /// `rx_counter` increments for any successfully decoded reply frame,
    /// whether or not it correlates with the request. The decoded reply
    /// is returned as-is for the caller to reinterpret through the
    /// message catalog.
    ///
    /// Fails with [`CommError::SessionClosed`] after [`Session::close`],
    /// [`CommError::Timeout`] when no complete frame arrives within the
    /// configured deadline, and [`CommError::MalformedFrame`] when a reply
    /// frame fails validation.
    pub fn send(
        &mut self,
        msg: &ConcentratedMessage,
    ) -> Result<ConcentratedMessage, CommError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let transport = self.transport.as_mut().ok_or(CommError::SessionClosed)?;

        let bytes = msg.to_bytes();
        trace!(
            counter = msg.counter(),
            opcode = msg.opcode(),
            len = bytes.len(),
            "sending frame"
        );
        transport.write_all(&bytes)?;
        self.tx_counter += 1;

        // Poll for reply bytes until one frame decodes or the deadline
        // passes
        let mut buf = [0u8; MAX_FRAME_LEN];
        let deadline = Instant::now() + timeout;

        loop {
            let available = transport.bytes_to_read()? as usize;
            if available > 0 {
                let to_read = available.min(buf.len());
                match transport.read(&mut buf[..to_read]) {
                    Ok(0) => {}
                    Ok(n) => {
                        trace!(bytes = n, "read reply chunk");
                        self.accumulator.extend(&buf[..n]);
                        match self.accumulator.pop_frame() {
                            Ok(Some(reply)) => {
                                self.rx_counter += 1;
                                debug!(
                                    counter = reply.counter(),
                                    opcode = reply.opcode(),
                                    "received frame"
                                );
                                return Ok(reply);
                            }
                            Ok(None) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => return Err(CommError::Io(e)),
                }
            }

            if Instant::now() >= deadline {
                debug!(timeout_ms = self.config.timeout_ms, "reply deadline passed");
                return Err(CommError::Timeout);
            }
            if available == 0 {
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }

    /// Close the session, releasing the transport. Idempotent.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            debug!(port = %self.config.port_name, "session closed");
        }
        self.state = SessionState::Closed;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
