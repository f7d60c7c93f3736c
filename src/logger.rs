//! Log output setup: stderr by default, or a file with `--log`.

use std::fs::File;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::parse_args::Verbosity;

impl Verbosity {
    /// Filter directive for this level; `RUST_LOG` takes precedence
    pub fn directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "warn,vice_bm_smoke=info",
            Verbosity::Verbose => "info,vice_bm_smoke=debug,vice_bm_protocol=debug",
            Verbosity::Trace => "debug,vice_bm_smoke=trace,vice_bm_protocol=trace",
            Verbosity::TraceAll => "trace",
        }
    }
}

/// Install the global subscriber
pub fn init(verbosity: Verbosity, log_file: Option<&str>) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= Verbosity::Trace);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };
    installed.map_err(io::Error::other)
}
