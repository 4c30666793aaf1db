#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{tool} is not available on this system")]
    ToolUnavailable { tool: String },

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} failed (exit {code}): {stderr}")]
    CommandFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("authentication cancelled while elevating {tool}")]
    ElevationDeclined { tool: String },

    #[error("instance lock error: {0}")]
    Lock(String),

    #[error("could not signal existing instance: {0}")]
    SignalDelivery(String),

    #[error("profile store error: {0}")]
    ProfileStore(String),
}

impl Error {
    /// True for the one failure a caller should not retry automatically:
    /// the user explicitly dismissed the elevation prompt.
    pub fn is_elevation_declined(&self) -> bool {
        matches!(self, Error::ElevationDeclined { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
