//! Elapsed-time bookkeeping for monitor commands.
//!
//! A [`Timings`] value is threaded through every command instead of living
//! in a global, and the caller reports the collected records at the end.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::debug;

/// One measured step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingRecord {
    pub scope: String,
    pub label: String,
    pub elapsed_ms: u128,
}

/// Ordered log of measured steps, grouped by a current scope
#[derive(Debug, Clone, Default)]
pub struct Timings {
    scope: String,
    records: Vec<TimingRecord>,
}

impl Timings {
    pub fn new(scope: impl Into<String>) -> Self {
        Timings {
            scope: scope.into(),
            records: Vec::new(),
        }
    }

    /// Scope attached to subsequent records
    pub fn set_scope(&mut self, scope: impl Into<String>) {
        self.scope = scope.into();
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Append a record under the current scope
    pub fn record(&mut self, label: impl Into<String>, elapsed: Duration) {
        let record = TimingRecord {
            scope: self.scope.clone(),
            label: label.into(),
            elapsed_ms: elapsed.as_millis(),
        };
        debug!("[t] {}:{}={}ms", record.scope, record.label, record.elapsed_ms);
        self.records.push(record);
    }

    /// Run `f` and record how long it took, whether it succeeded or not
    pub fn time<T>(&mut self, label: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TimingRecord> {
        self.records
    }
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(
                f,
                "[timing] {}.{} {}ms",
                record.scope, record.label, record.elapsed_ms
            )?;
        }
        Ok(())
    }
}
