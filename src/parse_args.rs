use std::net::IpAddr;
use std::time::Duration;

use crate::scenario::Delays;

const HELP: &str = "\
VICE binary monitor smoke test

Starts VICE with the binary monitor enabled, checks memory access, runs a
BASIC program injected over the monitor, then repeats the check with an
autostarted program on a second instance.

USAGE:
  vice-bm-smoke [OPTIONS]

OPTIONS:
  -h, --help                 Prints help information
  --vice <path>              VICE binary (default: $VICE_BINARY or x64sc)
  --host <addr>              Monitor listen address (default: 127.0.0.1)
  --port <port>              Monitor port for the injection run (default: 6502)
  --autostart-port <port>    Monitor port for the autostart run (default: 6510)
  --skip-autostart           Only run the injection flow
  --request-id <n>           Request id sent with every command (default: 1)
  --reset-delay-ms <ms>      Wait after soft reset (default: 800)
  --settle-ms <ms>           Wait after RUN before reading the screen (default: 1500)
  --poll-interval-ms <ms>    Screen poll interval for autostart (default: 50)
  --poll-timeout-ms <ms>     Screen poll deadline for autostart (default: 3000)
  --port-timeout-ms <ms>     How long VICE may take to open its port (default: 10000)
  -v, --verbose              Show commands and byte counts
  -vv, --trace               Show every frame as hex
  -vvv, --trace-all          Trace output from every crate, not just this tool
  --log <file>               Write log output to file instead of stderr
";

/// Verbosity level for debug output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    /// Progress and failures only
    #[default]
    Quiet = 0,
    /// Individual monitor commands, timings
    Verbose = 1,
    /// Raw frames
    Trace = 2,
    /// Everything, dependencies included
    TraceAll = 3,
}

#[derive(Debug)]
pub struct AppArgs {
    pub vice_bin: String,
    pub host: IpAddr,
    pub port: u16,
    pub autostart_port: u16,
    pub skip_autostart: bool,
    pub request_id: u32,
    pub delays: Delays,
    pub verbosity: Verbosity,
    pub log_file: Option<String>,
}

pub fn parse_args() -> Result<AppArgs, pico_args::Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{}", HELP);
        std::process::exit(0);
    }

    let args = parse_from(&mut pargs, std::env::var("VICE_BINARY").ok())?;

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        eprintln!("Warning: unused arguments left: {:?}.", remaining);
    }

    Ok(args)
}

fn parse_from(
    pargs: &mut pico_args::Arguments,
    vice_env: Option<String>,
) -> Result<AppArgs, pico_args::Error> {
    let verbosity = if pargs.contains("--trace-all") || pargs.contains("-vvv") {
        Verbosity::TraceAll
    } else if pargs.contains("--trace") || pargs.contains("-vv") {
        Verbosity::Trace
    } else if pargs.contains(["-v", "--verbose"]) {
        Verbosity::Verbose
    } else {
        Verbosity::Quiet
    };

    let defaults = Delays::default();
    let delays = Delays {
        reset_settle: millis_or(pargs, "--reset-delay-ms", defaults.reset_settle)?,
        run_settle: millis_or(pargs, "--settle-ms", defaults.run_settle)?,
        poll_interval: millis_or(pargs, "--poll-interval-ms", defaults.poll_interval)?,
        poll_timeout: millis_or(pargs, "--poll-timeout-ms", defaults.poll_timeout)?,
        port_timeout: millis_or(pargs, "--port-timeout-ms", defaults.port_timeout)?,
        ..defaults
    };

    Ok(AppArgs {
        vice_bin: pargs
            .opt_value_from_str("--vice")?
            .or(vice_env)
            .unwrap_or_else(|| "x64sc".to_string()),
        host: pargs
            .opt_value_from_str("--host")?
            .unwrap_or(IpAddr::from([127, 0, 0, 1])),
        port: pargs
            .opt_value_from_str("--port")?
            .unwrap_or(vice_bm_protocol::DEFAULT_PORT),
        autostart_port: pargs.opt_value_from_str("--autostart-port")?.unwrap_or(6510),
        skip_autostart: pargs.contains("--skip-autostart"),
        request_id: pargs.opt_value_from_str("--request-id")?.unwrap_or(1),
        delays,
        verbosity,
        log_file: pargs.opt_value_from_str("--log")?,
    })
}

fn millis_or(
    pargs: &mut pico_args::Arguments,
    key: &'static str,
    default: Duration,
) -> Result<Duration, pico_args::Error> {
    Ok(pargs
        .opt_value_from_str::<_, u64>(key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}
