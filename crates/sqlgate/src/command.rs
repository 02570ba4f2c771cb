//! Command protocol surface for sqlgate
//!
//! The adapter exposes a fixed table of named operations to its host
//! dispatcher. [`CommandName`] is that table; [`CommandOutput`] is the
//! shape of a successful result.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::result::TabularResult;

/// The fixed set of operations this backend implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    /// Open (or re-reference) a named connection
    Open,
    /// Close a named connection, optionally forced
    Close,
    /// Force-close every connection and release transport resources
    Exit,
    /// Register a named connection's credentials and target
    DefineConnection,
    /// Build and execute a SELECT, returning a table
    Select,
    /// Build and execute an INSERT
    Insert,
    /// Build and execute an UPDATE
    Update,
    /// Execute a stored procedure (permanently unsupported)
    Procedure,
    /// Execute a raw statement verbatim
    Query,
    /// Escape a string for literal embedding
    EscapeString,
    /// Backend-side auth-hash check (permanently unsupported)
    CheckAuth,
    /// Report the backend's identification record
    Identify,
}

impl CommandName {
    /// The protocol name of this command
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Exit => "exit",
            Self::DefineConnection => "define-connection",
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Procedure => "procedure",
            Self::Query => "query",
            Self::EscapeString => "escape-string",
            Self::CheckAuth => "check-auth",
            Self::Identify => "identify",
        }
    }

    /// All commands in protocol-table order
    pub const ALL: [CommandName; 12] = [
        Self::Open,
        Self::Close,
        Self::Exit,
        Self::DefineConnection,
        Self::Select,
        Self::Insert,
        Self::Update,
        Self::Procedure,
        Self::Query,
        Self::EscapeString,
        Self::CheckAuth,
        Self::Identify,
    ];
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::bad_request(format!("unknown command '{}'", s)))
    }
}

/// Successful output of a dispatched command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// The command succeeded without producing data
    Done,
    /// The command produced a table
    Table(TabularResult),
    /// The command produced a single string (escape-string)
    Text(String),
}

impl CommandOutput {
    /// The produced table, if any
    pub fn table(&self) -> Option<&TabularResult> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }

    /// The produced text, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}
