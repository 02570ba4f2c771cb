//! # sqlgate
//!
//! A SQL backend adapter that exposes a tabular database over a fixed,
//! synchronous command protocol: open, close, define-connection, select,
//! insert, update, query, escape-string, identify, exit.
//!
//! The host framework owns command parsing and lifecycle policy; sqlgate
//! owns the named connection cache (reference-counted, with idle-timeout
//! eviction), statement assembly, and row materialization into a flat,
//! self-describing [`TabularResult`]. The database driver sits behind the
//! [`Transport`] seam; a TDS implementation backed by tiberius ships
//! behind the `tds` feature (on by default).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqlgate::prelude::*;
//!
//! let session = SqlSession::new(Arc::new(TdsTransport::new().with_trust_cert(true)));
//!
//! // name, user, password, "database@host[:port]", ttl seconds
//! session
//!     .define_connection("default", "ftp", "secret", "ftpusers@db1", Some("30"))
//!     .await?;
//!
//! let table = session
//!     .select(&["default", "users", "userid, count", "userid='aah'", "2"])
//!     .await?;
//! for row in table.iter_rows() {
//!     println!("{:?}", row);
//! }
//!
//! session.shutdown().await;
//! ```
//!
//! ## Feature Flags
//!
//! - `tds` - TDS (SQL Server / Sybase) transport via tiberius (default)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod command;
pub mod error;
pub mod query;
pub mod registry;
pub mod result;
pub mod session;
pub mod transport;

#[cfg(feature = "tds")]
pub mod tds;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};

    pub use crate::transport::{
        escape_quotes, unescape_quotes, Credentials, TextRow, Transport, TransportHandle,
    };

    pub use crate::registry::{ConnectionRegistry, ConnectionStatus, DSQUERY_ENV};

    pub use crate::result::{materialize, TabularResult, CELL_TEXT_MAX};

    pub use crate::command::{CommandName, CommandOutput};

    pub use crate::session::{SqlSession, BACKEND_IDENT, SQL_API_VERSION};

    #[cfg(feature = "tds")]
    pub use crate::tds::{TdsHandle, TdsTransport};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use result::TabularResult;
pub use session::SqlSession;
pub use transport::Transport;
