//! Typed binary monitor commands.
//!
//! Each command opens its own [`Session`], sends one request, and picks the
//! matching response out of whatever the emulator sent back. Elapsed time
//! goes into the caller's [`Timings`], also when the command fails.

use std::fmt;
use std::net::SocketAddr;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::frame::{self, command};
use crate::matcher;
use crate::session::{Session, SessionConfig};
use crate::timing::Timings;

/// Memory space selector for the main CPU
const MEMSPACE_MAIN: u8 = 0x00;

/// Bank id of the default (CPU view) bank
const BANK_DEFAULT: u16 = 0x0000;

/// Maximum text length accepted by a single keyboard feed
pub const MAX_KEYBOARD_TEXT: usize = u8::MAX as usize;

/// An inclusive address range in the 64K address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u16,
    pub end: u16,
}

impl MemoryRegion {
    /// Region of `len` bytes starting at `start`
    pub fn new(start: u16, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::InvalidRequest(format!(
                "empty memory region at ${:04X}",
                start
            )));
        }
        let end = (start as usize)
            .checked_add(len - 1)
            .and_then(|end| u16::try_from(end).ok())
            .ok_or_else(|| {
                Error::InvalidRequest(format!(
                    "{} bytes from ${:04X} run past $FFFF",
                    len, start
                ))
            })?;
        Ok(MemoryRegion { start, end })
    }

    pub fn len(&self) -> usize {
        self.end as usize - self.start as usize + 1
    }

    /// Always false; regions hold at least one byte
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Region descriptor used by MEMORY_GET and MEMORY_SET:
    /// `[side_effects:u8][start:u16-LE][end:u16-LE][memspace:u8][bank:u16-LE]`
    pub fn descriptor(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(8);
        body.push(0x00); // no side effects
        body.extend_from_slice(&self.start.to_le_bytes());
        body.extend_from_slice(&self.end.to_le_bytes());
        body.push(MEMSPACE_MAIN);
        body.extend_from_slice(&BANK_DEFAULT.to_le_bytes());
        body
    }
}

/// Reset selector for the RESET command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Soft = 0,
    Hard = 1,
}

/// Emulator version as reported by the INFO command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Version components, most significant first
    pub version: Vec<u8>,
    pub revision: Option<u32>,
}

impl VersionInfo {
    /// Parse `[len:u8][version...][len:u8][revision:u32-LE]`.
    ///
    /// Parts missing from a short body are left empty.
    pub fn parse(body: &[u8]) -> Self {
        let mut info = VersionInfo::default();
        let Some((&len, rest)) = body.split_first() else {
            return info;
        };
        let Some(version) = rest.get(..len as usize) else {
            return info;
        };
        info.version = version.to_vec();
        let rest = &rest[len as usize..];
        if let [4, a, b, c, d, ..] = *rest {
            info.revision = Some(u32::from_le_bytes([a, b, c, d]));
        }
        info
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            write!(f, "unknown")?;
        } else {
            let parts: Vec<String> = self.version.iter().map(|v| v.to_string()).collect();
            write!(f, "{}", parts.join("."))?;
        }
        if let Some(rev) = self.revision {
            write!(f, " (r{})", rev)?;
        }
        Ok(())
    }
}

/// Settings shared by every command
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub session: SessionConfig,
    /// Request id sent with every command and expected back in the reply
    pub request_id: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            session: SessionConfig::default(),
            request_id: 1,
        }
    }
}

/// Client for one binary monitor endpoint
#[derive(Debug, Clone)]
pub struct Monitor {
    addr: SocketAddr,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(addr: SocketAddr, config: MonitorConfig) -> Self {
        Monitor { addr, config }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Query the emulator version; proves the monitor answers requests
    pub fn info(&self, timings: &mut Timings, label: &str) -> Result<VersionInfo> {
        let body = self.request(timings, label, command::INFO, &[])?;
        let info = VersionInfo::parse(&body);
        debug!("monitor reports VICE {}", info);
        Ok(info)
    }

    /// Read exactly `len` bytes starting at `addr`
    pub fn read_memory(
        &self,
        timings: &mut Timings,
        label: &str,
        addr: u16,
        len: usize,
    ) -> Result<Vec<u8>> {
        if len > u16::MAX as usize {
            return Err(Error::InvalidRequest(format!(
                "cannot read {} bytes in one request",
                len
            )));
        }
        let region = MemoryRegion::new(addr, len)?;
        let body = self.request(timings, label, command::MEMORY_GET, &region.descriptor())?;
        let data = memory_payload(&body, len)?;
        debug!("read {} bytes from ${:04X}", data.len(), addr);
        Ok(data.to_vec())
    }

    /// Write `data` starting at `addr`
    pub fn write_memory(
        &self,
        timings: &mut Timings,
        label: &str,
        addr: u16,
        data: &[u8],
    ) -> Result<()> {
        let region = MemoryRegion::new(addr, data.len())?;
        let mut body = region.descriptor();
        body.extend_from_slice(data);
        self.request(timings, label, command::MEMORY_SET, &body)?;
        debug!("wrote {} bytes to ${:04X}", data.len(), addr);
        Ok(())
    }

    /// Push `text` into the emulated keyboard buffer
    pub fn feed_keyboard(&self, timings: &mut Timings, label: &str, text: &str) -> Result<()> {
        if !text.is_ascii() {
            return Err(Error::InvalidRequest(format!(
                "keyboard text must be ASCII: {:?}",
                text
            )));
        }
        if text.len() > MAX_KEYBOARD_TEXT {
            return Err(Error::InvalidRequest(format!(
                "keyboard text is {} bytes, limit is {}",
                text.len(),
                MAX_KEYBOARD_TEXT
            )));
        }
        let mut body = Vec::with_capacity(1 + text.len());
        body.push(text.len() as u8);
        body.extend_from_slice(text.as_bytes());
        self.request(timings, label, command::KEYBOARD_FEED, &body)?;
        debug!("fed {:?} to the keyboard buffer", text);
        Ok(())
    }

    pub fn reset(&self, timings: &mut Timings, label: &str, kind: ResetKind) -> Result<()> {
        self.request(timings, label, command::RESET, &[kind as u8])?;
        debug!("{:?} reset acknowledged", kind);
        Ok(())
    }

    /// One full request/response cycle; returns the matched response body
    fn request(
        &self,
        timings: &mut Timings,
        label: &str,
        command: u8,
        body: &[u8],
    ) -> Result<Vec<u8>> {
        let request_id = self.config.request_id;
        let frame = frame::encode(command, request_id, body);
        let stream = timings.time(label, || {
            Session::round_trip(self.addr, &self.config.session, &frame)
        })?;

        if let Some(response) = matcher::find(&stream, command, Some(request_id)) {
            return Ok(response.body.to_vec());
        }

        let error_code = matcher::find_error(&stream, command, Some(request_id));
        if let Some(code) = error_code {
            warn!(
                "monitor rejected command 0x{:02X} with error 0x{:02X}",
                command, code
            );
        }
        Err(Error::NoResponse {
            command,
            request_id,
            error_code,
        })
    }
}

/// Extract the data of a MEMORY_GET response: `[count:u16-LE][bytes...]`
fn memory_payload(body: &[u8], expected: usize) -> Result<&[u8]> {
    let [lo, hi, data @ ..] = body else {
        return Err(Error::MalformedResponse(format!(
            "memory response body is {} bytes, too short for a count",
            body.len()
        )));
    };
    let count = u16::from_le_bytes([*lo, *hi]) as usize;
    if count != expected {
        return Err(Error::MalformedResponse(format!(
            "asked for {} bytes, monitor returned {}",
            expected, count
        )));
    }
    data.get(..count).ok_or_else(|| {
        Error::MalformedResponse(format!(
            "memory response declares {} bytes but carries {}",
            count,
            data.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_descriptor_layout() {
        let region = MemoryRegion::new(0x0801, 15).unwrap();
        assert_eq!(region.end, 0x080F);
        assert_eq!(region.len(), 15);
        assert_eq!(
            region.descriptor(),
            vec![0x00, 0x01, 0x08, 0x0F, 0x08, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_region_single_byte() {
        let region = MemoryRegion::new(0x0800, 1).unwrap();
        assert_eq!(region.start, region.end);
    }

    #[test]
    fn test_region_rejects_empty_and_wrapping() {
        assert!(matches!(
            MemoryRegion::new(0x0800, 0),
            Err(Error::InvalidRequest(_))
        ));
        assert!(matches!(
            MemoryRegion::new(0xFFFF, 2),
            Err(Error::InvalidRequest(_))
        ));
        assert_eq!(MemoryRegion::new(0xFFFF, 1).unwrap().end, 0xFFFF);
        assert_eq!(MemoryRegion::new(0x0000, 0x10000).unwrap().end, 0xFFFF);
    }

    #[test]
    fn test_memory_payload() {
        assert_eq!(memory_payload(&[0x01, 0x00, 0x42], 1).unwrap(), &[0x42]);
    }

    #[test]
    fn test_memory_payload_ignores_extra_bytes() {
        assert_eq!(
            memory_payload(&[0x02, 0x00, 0x10, 0x20, 0x30], 2).unwrap(),
            &[0x10, 0x20]
        );
    }

    #[test]
    fn test_memory_payload_count_mismatch() {
        assert!(matches!(
            memory_payload(&[0x02, 0x00, 0x10, 0x20], 1),
            Err(Error::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_memory_payload_short_body() {
        assert!(memory_payload(&[0x01], 1).is_err());
        assert!(memory_payload(&[0x03, 0x00, 0x10], 3).is_err());
    }

    #[test]
    fn test_version_info_parse() {
        let body = [0x04, 3, 7, 1, 0, 0x04, 0x39, 0x30, 0x00, 0x00];
        let info = VersionInfo::parse(&body);
        assert_eq!(info.version, vec![3, 7, 1, 0]);
        assert_eq!(info.revision, Some(12345));
        assert_eq!(info.to_string(), "3.7.1.0 (r12345)");
    }

    #[test]
    fn test_version_info_parse_short_body() {
        assert_eq!(VersionInfo::parse(&[]).to_string(), "unknown");
        assert_eq!(VersionInfo::parse(&[0x04, 3, 6]).version, Vec::<u8>::new());
        let info = VersionInfo::parse(&[0x02, 3, 6]);
        assert_eq!(info.to_string(), "3.6");
    }
}
