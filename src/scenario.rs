//! The smoke test flows.
//!
//! * injection: memory read/write sanity, then a BASIC program written
//!   straight into memory and started by typing `RUN`.
//! * autostart: a fresh emulator loads the same program from a `.prg` file
//!   and the screen is polled until the output appears.

use std::ffi::OsString;
use std::net::SocketAddr;
use std::time::Duration;

use tracing::info;
use vice_bm_protocol::{
    find_subsequence, fmt_hex, poll_until, screen_position, Monitor, MonitorConfig, ResetKind,
    Timings,
};

use crate::emulator::EmulatorProcess;
use crate::error::SmokeError;
use crate::program::{self, PrgFile, BASIC_POINTERS, PROGRAM_BASE, SCREEN_BASE, SCREEN_SIZE};

/// Address used for the write/read-back check
const SCRATCH_ADDR: u16 = 0x0800;
const SCRATCH_VALUE: u8 = 0x42;

/// Fixed waits. The monitor reports neither "reset done" nor "program
/// finished", so these are the only synchronization available.
#[derive(Debug, Clone)]
pub struct Delays {
    /// After a soft reset, until BASIC shows READY
    pub reset_settle: Duration,
    /// After typing RUN, until the program has printed
    pub run_settle: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Overall wait for the monitor port to open
    pub port_timeout: Duration,
    /// Connect timeout of a single readiness probe
    pub port_probe: Duration,
    pub port_retry: Duration,
    /// How long a terminated emulator may take before it is killed
    pub terminate_grace: Duration,
}

impl Default for Delays {
    fn default() -> Self {
        Delays {
            reset_settle: Duration::from_millis(800),
            run_settle: Duration::from_millis(1500),
            poll_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_millis(3000),
            port_timeout: Duration::from_secs(10),
            port_probe: Duration::from_millis(300),
            port_retry: Duration::from_millis(250),
            terminate_grace: Duration::from_secs(2),
        }
    }
}

/// Everything a flow needs besides the timing log
#[derive(Debug, Clone)]
pub struct Setup {
    pub vice_bin: String,
    pub monitor: MonitorConfig,
    pub delays: Delays,
}

/// Info handshake; proves the monitor answers
pub fn check_info(monitor: &Monitor, timings: &mut Timings) -> Result<(), SmokeError> {
    let version = monitor.info(timings, "bm_info")?;
    info!("[✓] VICE info OK (version {})", version);
    Ok(())
}

/// Write one byte and read it back
pub fn check_memory_roundtrip(monitor: &Monitor, timings: &mut Timings) -> Result<(), SmokeError> {
    let label = format!("bm_write_${:04X}", SCRATCH_ADDR);
    monitor.write_memory(timings, &label, SCRATCH_ADDR, &[SCRATCH_VALUE])?;
    info!("[✓] Wrote 1 byte to ${:04X}", SCRATCH_ADDR);

    let label = format!("bm_read_${:04X}", SCRATCH_ADDR);
    let value = monitor.read_memory(timings, &label, SCRATCH_ADDR, 1)?;
    if value != [SCRATCH_VALUE] {
        return Err(SmokeError::Check(format!(
            "memory readback mismatch at ${:04X}: wrote {:02X}, read {}",
            SCRATCH_ADDR,
            SCRATCH_VALUE,
            fmt_hex(&value)
        )));
    }
    info!("[✓] Memory read/write OK");
    Ok(())
}

/// Inject `10 PRINT "HELLO"`, type RUN, and look for the output on screen
pub fn run_basic_hello(
    monitor: &Monitor,
    timings: &mut Timings,
    delays: &Delays,
) -> Result<(), SmokeError> {
    // Start from a clean READY prompt
    monitor.reset(timings, "bm_reset_soft", ResetKind::Soft)?;
    std::thread::sleep(delays.reset_settle);

    let program = program::hello_program();
    monitor.write_memory(timings, "bm_write_program", PROGRAM_BASE, &program)?;
    monitor.write_memory(
        timings,
        "bm_patch_basic_pointers",
        BASIC_POINTERS,
        &program::basic_pointers(program.len()),
    )?;
    info!("[+] BASIC program loaded");

    monitor.feed_keyboard(timings, "bm_keyboard_feed", "RUN\r")?;
    info!("[+] Executed RUN command");
    std::thread::sleep(delays.run_settle);

    let screen = monitor.read_memory(timings, "bm_read_screen", SCREEN_BASE, SCREEN_SIZE)?;
    let expected = program::screen_codes(program::HELLO);
    match find_subsequence(&screen, &expected) {
        Some(offset) => {
            let (row, col) = screen_position(offset);
            info!("[✓] Detected 'HELLO' on screen at row {}, column {}", row, col);
            Ok(())
        }
        None => {
            let preview = &screen[..screen.len().min(vice_bm_protocol::PREVIEW_LEN)];
            Err(vice_bm_protocol::Error::Verification {
                what: "'HELLO' on screen".to_string(),
                preview: fmt_hex(preview),
            }
            .into())
        }
    }
}

/// Poll the screen until the autostarted program has printed HELLO
pub fn wait_for_hello(
    monitor: &Monitor,
    timings: &mut Timings,
    delays: &Delays,
) -> Result<(), SmokeError> {
    let expected = program::screen_codes(program::HELLO);
    let start = std::time::Instant::now();
    let outcome = poll_until(
        || monitor.read_memory(timings, "bm_read_screen", SCREEN_BASE, SCREEN_SIZE),
        |screen| find_subsequence(screen, &expected).is_some(),
        delays.poll_interval,
        delays.poll_timeout,
    );
    timings.record("wait_hello", start.elapsed());

    let screen = outcome?.into_verified("[autostart] 'HELLO' on screen")?;
    if let Some(offset) = find_subsequence(&screen, &expected) {
        let (row, col) = screen_position(offset);
        info!("[✓] [autostart] Detected 'HELLO' at row {}, col {}", row, col);
    }
    Ok(())
}

/// Injection flow against a freshly started emulator on `addr`
pub fn run_injection(
    setup: &Setup,
    addr: SocketAddr,
    timings: &mut Timings,
) -> Result<(), SmokeError> {
    timings.set_scope("injection");
    info!("[+] Launching VICE (injection flow)...");
    let mut vice = timings.time("spawn_vice", || {
        EmulatorProcess::spawn(&setup.vice_bin, addr, &[], setup.delays.terminate_grace)
    })?;
    timings.time("wait_port", || {
        vice.wait_until_listening(addr, &setup.delays)
    })?;

    let monitor = Monitor::new(addr, setup.monitor.clone());
    check_info(&monitor, timings)?;
    check_memory_roundtrip(&monitor, timings)?;
    run_basic_hello(&monitor, timings, &setup.delays)?;

    info!("[+] Cleaning up injection instance...");
    timings
        .time("cleanup_vice", || vice.terminate())
        .map_err(|e| SmokeError::io("stopping VICE", e))?;
    Ok(())
}

/// Autostart flow: a second emulator boots straight into the program
pub fn run_autostart(
    setup: &Setup,
    addr: SocketAddr,
    timings: &mut Timings,
) -> Result<(), SmokeError> {
    timings.set_scope("autostart");
    let prg = timings
        .time("prepare_prg", || PrgFile::write(&program::hello_program()))
        .map_err(|e| SmokeError::io("writing .prg file", e))?;

    info!("[+] Launching VICE (autostart flow)...");
    let extra = [
        OsString::from("-autostart"),
        prg.path().as_os_str().to_owned(),
    ];
    let mut vice = timings.time("spawn_vice", || {
        EmulatorProcess::spawn(&setup.vice_bin, addr, &extra, setup.delays.terminate_grace)
    })?;
    timings.time("wait_port", || {
        vice.wait_until_listening(addr, &setup.delays)
    })?;

    let monitor = Monitor::new(addr, setup.monitor.clone());
    check_info(&monitor, timings)?;
    wait_for_hello(&monitor, timings, &setup.delays)?;

    timings
        .time("cleanup_vice", || vice.terminate())
        .map_err(|e| SmokeError::io("stopping VICE", e))?;
    // `prg` is removed when it goes out of scope
    Ok(())
}
