//! # SwordFish Communication Library
//!
//! Core functionality for talking to SwordFish devices over a serial link.
//!
//! This library provides:
//! - Serial port discovery with a VID/PID heuristic for SwordFish adapters
//! - The concentrated message wire codec (framing, checksum, reassembly)
//! - A typed message catalog (`Ping`, `VersionData`) with opcode dispatch
//! - A blocking request/response [`Session`] with tx/rx counters
//!
//! ## Example
//!
//! ```rust,ignore
//! use swordfish_com::{find_probable_port, Message, Ping, Session, SessionConfig};
//!
//! let port = find_probable_port().expect("no SwordFish adapter found");
//! let mut session = Session::open(SessionConfig::for_port(&port.name))?;
//!
//! let request = Ping.to_concentrated(session.tx_counter() as u16)?;
//! let reply = session.send(&request)?;
//! let pong = Ping::from_concentrated(&reply)?;
//! println!("{}", pong.describe());
//! ```

#![warn(missing_docs)]

pub mod discovery;
pub mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod transport;

pub use discovery::{find_probable_port, list_ports, PortInfo};
pub use error::CommError;
pub use frame::{ConcentratedMessage, FrameAccumulator, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
pub use message::{decode_message, AnyMessage, Message, Ping, VersionData};
pub use session::{Session, SessionConfig, SessionState};
pub use transport::{SerialTransport, Transport};

/// Default baud rate for SwordFish devices
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default deadline for a reply to a sent message, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 200;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
