pub mod auth;
pub mod codec;
pub mod config;
pub mod session;
pub mod store;
pub mod transport;

pub use auth::AuthError;
pub use codec::{DecodeError, EncodeError};
pub use config::ConfigError;
pub use session::SessionError;
pub use store::StoreError;
pub use transport::TransportError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
