//! In-process stand-in for the VICE binary monitor.
//!
//! Serves one connection at a time on a loopback port, greets every
//! connection with unsolicited event frames, and answers MEMORY_GET,
//! MEMORY_SET, KEYBOARD_FEED, INFO and RESET against a flat 64K memory.

#![allow(dead_code)]

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use vice_bm_protocol::frame::{command, encode_response, REQUEST_HEADER_SIZE};
use vice_bm_protocol::{MonitorConfig, SessionConfig};

pub const SCREEN: usize = 0x0400;
pub const TXTTAB: usize = 0x002B;
pub const PRINT_TOKEN: u8 = 0x99;

/// Screen codes for "HELLO" in the power-on character set
pub const HELLO_SCREEN_CODES: [u8; 5] = [0x08, 0x05, 0x0C, 0x0C, 0x0F];

/// Event ids VICE pushes without being asked
const EVENT_STOPPED: u8 = 0x62;
const EVENT_RESUMED: u8 = 0x63;
const EVENT_REQUEST_ID: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Default)]
pub struct FakeOptions {
    /// Show HELLO on screen this long after start-up, as an autostarted
    /// program would
    pub hello_after: Option<Duration>,
    /// Answer this command with the given error code instead of success
    pub reject: Option<(u8, u8)>,
    /// Never answer this command
    pub ignore: Option<u8>,
    /// Report this many bytes in MEMORY_GET responses regardless of the request
    pub count_override: Option<u16>,
}

struct State {
    memory: Vec<u8>,
    keyboard: Vec<u8>,
    resets: u32,
    started: Instant,
    options: FakeOptions,
}

pub struct FakeMonitor {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FakeMonitor {
    pub fn start() -> Self {
        Self::with_options(FakeOptions::default())
    }

    pub fn with_options(options: FakeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(Mutex::new(State {
            memory: vec![0x20; 0x10000],
            keyboard: Vec::new(),
            resets: 0,
            started: Instant::now(),
            options,
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_state = state.clone();
        let thread_shutdown = shutdown.clone();
        let thread = std::thread::spawn(move || {
            while !thread_shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => serve(stream, &thread_state),
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        FakeMonitor {
            addr,
            state,
            shutdown,
            thread: Some(thread),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peek(&self, addr: usize, len: usize) -> Vec<u8> {
        self.state.lock().unwrap().memory[addr..addr + len].to_vec()
    }

    pub fn keyboard(&self) -> Vec<u8> {
        self.state.lock().unwrap().keyboard.clone()
    }

    pub fn resets(&self) -> u32 {
        self.state.lock().unwrap().resets
    }
}

impl Drop for FakeMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Short timeouts so each command settles quickly against loopback
pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        session: SessionConfig {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(60),
            chunk_gap: Duration::from_millis(2),
            max_collect: Duration::from_secs(2),
        },
        request_id: 1,
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<State>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));

    let mut greeting = encode_response(EVENT_STOPPED, 0x00, EVENT_REQUEST_ID, &[0x00, 0x00]);
    greeting.extend(encode_response(EVENT_RESUMED, 0x00, EVENT_REQUEST_ID, &[0x00, 0x00]));
    if stream.write_all(&greeting).is_err() {
        return;
    }

    let mut header = [0u8; REQUEST_HEADER_SIZE];
    if stream.read_exact(&mut header).is_err() {
        return;
    }
    let body_len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]) as usize;
    let request_id = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
    let cmd = header[10];
    let mut body = vec![0u8; body_len];
    if stream.read_exact(&mut body).is_err() {
        return;
    }

    let reply = {
        let mut state = state.lock().unwrap();
        state.tick();
        handle(&mut state, cmd, request_id, &body)
    };
    if let Some(reply) = reply {
        // A stale reply to some other request travels ahead of the real one
        let mut out = encode_response(cmd, 0x00, request_id.wrapping_add(100), &[0x00, 0x00]);
        out.extend(encode_response(EVENT_RESUMED, 0x00, EVENT_REQUEST_ID, &[0x00, 0x00]));
        out.extend(reply);
        let _ = stream.write_all(&out);
    }

    // Hold the connection until the client hangs up
    let mut sink = [0u8; 64];
    while let Ok(n) = stream.read(&mut sink) {
        if n == 0 {
            break;
        }
    }
}

impl State {
    fn tick(&mut self) {
        if let Some(after) = self.options.hello_after {
            if self.started.elapsed() >= after {
                let at = SCREEN + 2 * 40;
                self.memory[at..at + 5].copy_from_slice(&HELLO_SCREEN_CODES);
            }
        }
    }

    /// Emulate RUN for a single `PRINT "..."` line at TXTTAB
    fn run_program(&mut self) {
        let txttab =
            u16::from_le_bytes([self.memory[TXTTAB], self.memory[TXTTAB + 1]]) as usize;
        let line = &self.memory[txttab..txttab + 64];
        if line.get(4) != Some(&PRINT_TOKEN) || line.get(5) != Some(&b'"') {
            return;
        }
        let text: Vec<u8> = line[6..]
            .iter()
            .take_while(|&&b| b != b'"')
            .map(|&b| if b.is_ascii_uppercase() { b - b'A' + 1 } else { b })
            .collect();
        let at = SCREEN + 40;
        self.memory[at..at + text.len()].copy_from_slice(&text);
    }
}

fn handle(state: &mut State, cmd: u8, request_id: u32, body: &[u8]) -> Option<Vec<u8>> {
    if state.options.ignore == Some(cmd) {
        return None;
    }
    if let Some((rejected, code)) = state.options.reject {
        if rejected == cmd {
            return Some(encode_response(cmd, code, request_id, &[]));
        }
    }

    let reply_body = match cmd {
        command::INFO => vec![0x04, 3, 7, 1, 0, 0x04, 0x39, 0x30, 0x00, 0x00],
        command::MEMORY_GET => {
            let start = u16::from_le_bytes([body[1], body[2]]) as usize;
            let end = u16::from_le_bytes([body[3], body[4]]) as usize;
            let data = &state.memory[start..=end];
            let count = state.options.count_override.unwrap_or(data.len() as u16);
            let mut reply = count.to_le_bytes().to_vec();
            reply.extend_from_slice(data);
            reply
        }
        command::MEMORY_SET => {
            let start = u16::from_le_bytes([body[1], body[2]]) as usize;
            let end = u16::from_le_bytes([body[3], body[4]]) as usize;
            state.memory[start..=end].copy_from_slice(&body[8..]);
            Vec::new()
        }
        command::KEYBOARD_FEED => {
            let len = body[0] as usize;
            let text = body[1..1 + len].to_vec();
            if text == b"RUN\r" {
                state.run_program();
            }
            state.keyboard.extend(text);
            Vec::new()
        }
        command::RESET => {
            state.resets += 1;
            Vec::new()
        }
        _ => return Some(encode_response(cmd, 0x83, request_id, &[])),
    };
    Some(encode_response(cmd, 0x00, request_id, &reply_body))
}
