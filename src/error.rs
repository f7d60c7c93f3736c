use thiserror::Error;

/// Failures that end a smoke test run
#[derive(Debug, Error)]
pub enum SmokeError {
    /// Talking to the binary monitor failed
    #[error(transparent)]
    Monitor(#[from] vice_bm_protocol::Error),

    /// The emulator process could not be started or never opened its port
    #[error("{0}")]
    Process(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The emulator answered, but with the wrong state
    #[error("{0}")]
    Check(String),
}

impl SmokeError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SmokeError::Io {
            context: context.into(),
            source,
        }
    }
}
