//! Shared primitives for the messenger transport workspace.
//!
//! Everything here is dependency-light and free of session logic so both the
//! transport engine and host applications can use it.
//!
//! - [`ErrorLocation`]: file/line/column captured with `#[track_caller]`
//! - [`RedactedToken`]: secret string that never reaches logs
//! - [`HttpStatusCode`]: status classification used for error mapping

pub mod error;
pub mod http_status;
pub mod redacted_token;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use http_status::HttpStatusCode;
pub use redacted_token::RedactedToken;

#[cfg(test)]
mod tests;
