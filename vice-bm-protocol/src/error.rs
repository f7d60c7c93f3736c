//! Error types for the binary monitor client.

use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised while talking to the binary monitor.
#[derive(Debug, Error)]
pub enum Error {
    /// The monitor port refused the connection or did not answer in time.
    #[error("cannot connect to binary monitor at {addr}: {source}")]
    Connection {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No successful response frame for the request was seen before the
    /// connection went quiet.
    #[error("no response to command 0x{command:02X} (request {request_id}){}", fmt_error_code(.error_code))]
    NoResponse {
        command: u8,
        request_id: u32,
        /// Error code of a matching frame that was rejected, if any.
        error_code: Option<u8>,
    },

    /// A response frame was found but its body does not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request cannot be expressed on the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The expected pattern never showed up in emulated memory.
    #[error("{what} not found; first observed bytes: {preview}")]
    Verification { what: String, preview: String },
}

fn fmt_error_code(code: &Option<u8>) -> String {
    match code {
        Some(code) => format!(", monitor returned error 0x{:02X}", code),
        None => String::new(),
    }
}

/// Result alias using the monitor [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
