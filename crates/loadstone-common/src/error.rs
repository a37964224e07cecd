use thiserror::Error;

/// Errors raised while constructing or running the balancer.
///
/// The forward path does not use this type: per-request outcomes travel as
/// tagged results (`ForwardResult`, `RequestResult`) so that a backend
/// failure is data, not an exception.
#[derive(Error, Debug)]
pub enum LoadstoneError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid backend list: {0}")]
    InvalidBackendList(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, LoadstoneError>;
