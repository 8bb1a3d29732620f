//! Server and registry errors.

use thiserror::Error;

/// Registration-time failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `push` was called with an empty event name.
    #[error("The event needs a name.")]
    EmptyEventName,
}

/// Server construction failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A registry was supplied but holds no handlers.
    #[error("Event stack need at least one event")]
    EmptyRegistry,
    /// Building the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Binding or serving failed.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
