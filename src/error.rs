use thiserror::Error;

/// Errors that can occur in the acceptor subsystem.
#[derive(Error, Debug)]
pub enum AcceptorError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The network stack refused to register the endpoint's 4-tuple
    #[error("Transport registration failed: {0}")]
    Registration(String),

    /// The handshake subsystem failed to complete the three-way handshake
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A segment was dropped because its options could not be parsed
    #[error("Unparsable SYN options")]
    OptionParse,

    /// An operation was attempted in a state that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`AcceptorError`]
pub type Result<T> = std::result::Result<T, AcceptorError>;
