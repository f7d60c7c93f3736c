mod emulator;
mod error;
mod logger;
mod parse_args;
mod program;
mod scenario;

use std::io::{self, Write};
use std::net::SocketAddr;

use tracing::{error, info};
use vice_bm_protocol::{MonitorConfig, SessionConfig, Timings};

use error::SmokeError;
use parse_args::{parse_args, AppArgs};
use scenario::Setup;

fn main() {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error parsing arguments: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = logger::init(args.verbosity, args.log_file.as_deref()) {
        eprintln!("Failed to set up logging: {}", e);
        std::process::exit(1);
    }

    let mut timings = Timings::new("injection");
    let result = run(&args, &mut timings);

    print!("{}", timings);
    if let Err(e) = result {
        let _ = report_failure(&e, &mut io::stderr());
        std::process::exit(1);
    }
    info!("[✓] All checks passed");
}

/// The one diagnostic line for a failed run. It goes to `out` whatever the
/// log filter or destination, and to the log as well.
fn report_failure(e: &SmokeError, out: &mut impl Write) -> io::Result<()> {
    error!("{}", e);
    writeln!(out, "Error: {}", e)
}

fn run(args: &AppArgs, timings: &mut Timings) -> Result<(), SmokeError> {
    let setup = Setup {
        vice_bin: args.vice_bin.clone(),
        monitor: MonitorConfig {
            session: SessionConfig::default(),
            request_id: args.request_id,
        },
        delays: args.delays.clone(),
    };

    scenario::run_injection(&setup, SocketAddr::new(args.host, args.port), timings)?;

    if !args.skip_autostart {
        scenario::run_autostart(
            &setup,
            SocketAddr::new(args.host, args.autostart_port),
            timings,
        )?;
    }
    Ok(())
}
