use common::ErrorLocation;

use thiserror::Error;

/// Errors raised by the console host.
///
/// Engine errors are flattened into `Session` with their own message, which
/// already carries the location they were raised at.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Error from this App
    #[error("Console Error: {message} {location}")]
    Console {
        message: String,
        location: ErrorLocation,
    },

    /// A stdin line that is not a valid command
    #[error("Usage Error: {message} {location}")]
    Usage {
        message: String,
        location: ErrorLocation,
    },

    /// Config could not be resolved from file, flags and environment
    #[error("Config Error: {message} {location}")]
    Config {
        message: String,
        location: ErrorLocation,
    },

    /// Error from transport-core operations
    #[error("Session Error: {message} {location}")]
    Session {
        message: String,
        location: ErrorLocation,
    },
}
