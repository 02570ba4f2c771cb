//! Error types for sqlgate
//!
//! Provides the adapter's error taxonomy with fatality classification:
//! - Recoverable errors (bad request, unknown/duplicate connection,
//!   transport failures, unsupported commands) are returned to the caller
//! - Fatal errors (connect failure, database-select failure, missing host
//!   configuration) mark the owning session as unrecoverable; the caller
//!   decides whether to tear the session down

use std::fmt;
use thiserror::Error;

/// Result type for sqlgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories surfaced to the host dispatcher as short tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong argument count or shape
    BadRequest,
    /// Named connection is not registered
    UnknownConnection,
    /// A connection with this name already exists
    DuplicateConnection,
    /// Failure reported by the database transport
    Transport,
    /// Command is permanently unimplemented by this backend
    Unsupported,
    /// Session-terminating condition (connect failure, database-select
    /// failure, missing host configuration)
    Fatal,
}

impl ErrorKind {
    /// Whether errors of this kind leave the owning session unusable
    #[inline]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Fatal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad_request"),
            Self::UnknownConnection => write!(f, "unknown_connection"),
            Self::DuplicateConnection => write!(f, "duplicate_connection"),
            Self::Transport => write!(f, "transport"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Main error type for sqlgate
#[derive(Error, Debug)]
pub enum Error {
    /// Badly formed request (argument count or shape)
    #[error("badly formed request: {message}")]
    BadRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Named connection was never defined
    #[error("unknown named connection '{name}'")]
    UnknownConnection {
        /// The connection name that failed lookup
        name: String,
    },

    /// A connection with this name is already registered
    #[error("named connection '{name}' already exists")]
    DuplicateConnection {
        /// The duplicated connection name
        name: String,
    },

    /// The transport reported a failure (execute, fetch, disconnect)
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable failure description
        message: String,
        /// Underlying driver error, when one exists
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Command is not supported by this backend
    #[error("backend does not support {command}")]
    Unsupported {
        /// The unsupported command name
        command: String,
    },

    /// Could not establish a physical connection to the server
    #[error("failed to connect to server '{server}': {message}")]
    ConnectFailed {
        /// Target server address
        server: String,
        /// Underlying transport failure description
        message: String,
    },

    /// Connected, but could not switch to the target database
    #[error("failed to select database '{database}': {message}")]
    DatabaseSelect {
        /// The database that could not be selected
        database: String,
        /// Underlying transport failure description
        message: String,
    },

    /// No host in the connection target and no environment fallback
    #[error("no host specified and the {env_var} environment variable is not set")]
    MissingHost {
        /// Name of the consulted environment variable
        env_var: &'static str,
    },
}

impl Error {
    /// Get the error's category tag
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } => ErrorKind::BadRequest,
            Self::UnknownConnection { .. } => ErrorKind::UnknownConnection,
            Self::DuplicateConnection { .. } => ErrorKind::DuplicateConnection,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::ConnectFailed { .. } | Self::DatabaseSelect { .. } | Self::MissingHost { .. } => {
                ErrorKind::Fatal
            }
        }
    }

    /// Whether this error leaves the owning session unusable
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Create a bad-request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create an unknown-connection error
    pub fn unknown_connection(name: impl Into<String>) -> Self {
        Self::UnknownConnection { name: name.into() }
    }

    /// Create a duplicate-connection error
    pub fn duplicate_connection(name: impl Into<String>) -> Self {
        Self::DuplicateConnection { name: name.into() }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an unsupported-command error
    pub fn unsupported(command: impl Into<String>) -> Self {
        Self::Unsupported {
            command: command.into(),
        }
    }

    /// Create a fatal connect-failure error
    pub fn connect_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a fatal database-select error
    pub fn database_select(database: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseSelect {
            database: database.into(),
            message: message.into(),
        }
    }
}
