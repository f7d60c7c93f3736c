//! One TCP request/response cycle against the binary monitor.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::fmt_hex;

/// Default TCP port of the binary monitor
pub const DEFAULT_PORT: u16 = 6502;

/// Read buffer size for a single `read` call
const CHUNK_SIZE: usize = 4096;

/// Timeouts governing a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound for establishing the TCP connection
    pub connect_timeout: Duration,
    /// A read that stays silent this long ends a collection window
    pub read_timeout: Duration,
    /// Pause after each received chunk so trailing segments can land
    pub chunk_gap: Duration,
    /// Hard cap on one collection window, however chatty the peer is
    pub max_collect: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_millis(300),
            chunk_gap: Duration::from_millis(20),
            max_collect: Duration::from_secs(2),
        }
    }
}

/// A connection used for exactly one request/response cycle.
///
/// The socket is shut down when the session is dropped, so every exit path
/// releases it.
pub struct Session {
    stream: TcpStream,
    addr: SocketAddr,
    chunk_gap: Duration,
    max_collect: Duration,
}

impl Session {
    /// Connect to the monitor at `addr`
    pub fn open(addr: SocketAddr, config: &SessionConfig) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)
            .map_err(|source| Error::Connection { addr, source })?;
        // Requests are tiny; don't let Nagle hold them back
        let _ = stream.set_nodelay(true);
        stream.set_read_timeout(Some(config.read_timeout))?;
        stream.set_write_timeout(Some(config.connect_timeout))?;
        debug!("connected to binary monitor at {}", addr);
        Ok(Session {
            stream,
            addr,
            chunk_gap: config.chunk_gap,
            max_collect: config.max_collect,
        })
    }

    /// Open a session, drain startup events, send `frame` and collect the reply
    pub fn round_trip(addr: SocketAddr, config: &SessionConfig, frame: &[u8]) -> Result<Vec<u8>> {
        let mut session = Session::open(addr, config)?;
        session.drain_pending()?;
        session.send_and_collect(frame)
    }

    /// Address of the connected monitor
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Discard whatever the emulator pushed unprompted after connect.
    ///
    /// Returns the number of bytes thrown away.
    pub fn drain_pending(&mut self) -> Result<usize> {
        let discarded = self.collect()?;
        if !discarded.is_empty() {
            debug!("drained {} unsolicited bytes", discarded.len());
            trace!("drained: {}", fmt_hex(&discarded));
        }
        Ok(discarded.len())
    }

    /// Write `frame` and read until the connection goes quiet or closes
    pub fn send_and_collect(&mut self, frame: &[u8]) -> Result<Vec<u8>> {
        trace!("-> {}", fmt_hex(frame));
        self.stream.write_all(frame)?;
        self.stream.flush()?;
        let response = self.collect()?;
        debug!("collected {} response bytes", response.len());
        trace!("<- {}", fmt_hex(&response));
        Ok(response)
    }

    /// Quiescence-based read: response sizes are not known up front.
    ///
    /// Ends after `max_collect` even if the peer never goes quiet.
    fn collect(&mut self) -> Result<Vec<u8>> {
        let start = Instant::now();
        let mut data = Vec::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    data.extend_from_slice(&chunk[..n]);
                    if start.elapsed() >= self.max_collect {
                        debug!(
                            "peer still sending after {:?}, ending collection",
                            self.max_collect
                        );
                        break;
                    }
                    if !self.chunk_gap.is_zero() {
                        std::thread::sleep(self.chunk_gap);
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(ref e) if is_quiet(e.kind()) => break,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(data)
    }
}

/// Read errors that end a collection window rather than fail it
fn is_quiet(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Poll until something accepts TCP connections on `addr`.
///
/// Each attempt is bounded by `probe_timeout`; failed attempts are retried
/// after `retry_delay` until `timeout` has elapsed.
pub fn wait_for_listener(
    addr: SocketAddr,
    timeout: Duration,
    probe_timeout: Duration,
    retry_delay: Duration,
) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        match TcpStream::connect_timeout(&addr, probe_timeout) {
            Ok(_) => {
                debug!("{} is accepting connections after {:?}", addr, start.elapsed());
                return true;
            }
            Err(e) => {
                trace!("{} not ready: {}", addr, e);
                std::thread::sleep(retry_delay);
            }
        }
    }
    false
}
