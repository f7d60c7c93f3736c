//! Deadline-bounded polling of emulated memory.
//!
//! The monitor has no "program finished" notification, so state changes are
//! confirmed by reading memory repeatedly until an expected pattern shows up.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::fmt_hex;

/// Width of the default text screen
pub const SCREEN_COLUMNS: usize = 40;

/// Number of observed bytes quoted in a verification failure
pub const PREVIEW_LEN: usize = 80;

/// Result of a polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub found: bool,
    pub attempts: u32,
    pub elapsed: Duration,
    /// The last observation; the matching one when `found` is set
    pub last: Vec<u8>,
}

impl PollOutcome {
    /// Turn a miss into [`Error::Verification`], quoting the start of the
    /// last observation; hands back that observation on success.
    pub fn into_verified(self, what: &str) -> Result<Vec<u8>> {
        if self.found {
            return Ok(self.last);
        }
        let end = self.last.len().min(PREVIEW_LEN);
        Err(Error::Verification {
            what: what.to_string(),
            preview: fmt_hex(&self.last[..end]),
        })
    }
}

/// Repeat `observe` until `predicate` accepts an observation or `deadline`
/// has passed, sleeping `interval` between attempts.
///
/// At least one observation is always made. Errors from `observe` end the
/// run immediately.
pub fn poll_until<O, P>(
    mut observe: O,
    mut predicate: P,
    interval: Duration,
    deadline: Duration,
) -> Result<PollOutcome>
where
    O: FnMut() -> Result<Vec<u8>>,
    P: FnMut(&[u8]) -> bool,
{
    let start = Instant::now();
    let mut attempts = 0;
    loop {
        let observation = observe()?;
        attempts += 1;
        let found = predicate(&observation);
        trace!("poll attempt {}: found={}", attempts, found);

        // No room left for another attempt before the deadline
        if found || start.elapsed() + interval > deadline {
            let elapsed = start.elapsed();
            debug!(
                "polling finished after {} attempts in {:?}, found={}",
                attempts, elapsed, found
            );
            return Ok(PollOutcome {
                found,
                attempts,
                elapsed,
                last: observation,
            });
        }
        std::thread::sleep(interval);
    }
}

/// Offset of the first occurrence of `needle` in `haystack`
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Row and column of a screen memory offset
pub fn screen_position(offset: usize) -> (usize, usize) {
    (offset / SCREEN_COLUMNS, offset % SCREEN_COLUMNS)
}
