//! # VICE Binary Monitor Protocol
//!
//! A blocking client for the binary monitor exposed by the VICE emulators
//! (`x64sc -binarymonitor`), plus the helpers needed to verify emulated
//! memory from the outside.
//!
//! ## Wire Format
//!
//! Requests and responses share a start marker and a little-endian length:
//! ```text
//! request:  [0x02][0x02][body_len:u32-LE][request_id:u32-LE][command:u8][body...]
//! response: [0x02][0x02][body_len:u32-LE][command:u8][error:u8][request_id:u32-LE][body...]
//! ```
//!
//! ## Commands
//!
//! | Type | Name | Request body | Response body |
//! |------|------|--------------|---------------|
//! | 0x01 | MEMORY_GET | region descriptor | count:u16, bytes |
//! | 0x02 | MEMORY_SET | region descriptor, bytes | empty |
//! | 0x72 | KEYBOARD_FEED | len:u8, text | empty |
//! | 0x85 | INFO | empty | version info |
//! | 0xCC | RESET | kind:u8 | empty |
//!
//! The emulator pushes unsolicited event frames on the same connection, so
//! responses are always located by command type and request id rather than
//! by position.

mod error;
pub mod frame;
pub mod matcher;
pub mod monitor;
pub mod poll;
pub mod session;
pub mod timing;

pub use error::{Error, Result};
pub use frame::{command, decode_all, encode, encode_response, Decoded, Frame, FrameDecoder};
pub use matcher::{find, find_error};
pub use monitor::{MemoryRegion, Monitor, MonitorConfig, ResetKind, VersionInfo, MAX_KEYBOARD_TEXT};
pub use poll::{
    find_subsequence, poll_until, screen_position, PollOutcome, PREVIEW_LEN, SCREEN_COLUMNS,
};
pub use session::{wait_for_listener, Session, SessionConfig, DEFAULT_PORT};
pub use timing::{TimingRecord, Timings};

/// Format bytes as a space separated hex string for diagnostics
pub fn fmt_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
