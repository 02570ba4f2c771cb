//! Transport traits for sqlgate
//!
//! The adapter drives the database through an opaque transport capability:
//! - Transport: opens physical connections and owns driver-global cleanup
//! - TransportHandle: one live connection; execute / fetch-row / escape
//!
//! The usage discipline is open -> use -> close per logical command. A
//! statement's pending rows must be fully drained before the handle can be
//! reused or closed cleanly, which is why `next_row` is a cursor rather
//! than a bulk fetch.

use async_trait::async_trait;
use std::fmt;

use crate::error::Result;

/// One row of a pending result, as bounded text cells (`None` = SQL NULL)
pub type TextRow = Vec<Option<String>>;

/// Stored credentials and target for one named connection
#[derive(Clone)]
pub struct Credentials {
    /// Server address, `host` or `host:port`
    pub server: String,
    /// Login user
    pub user: String,
    /// Login password
    pub password: String,
    /// Database to select after connecting
    pub database: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redact the password so descriptors can be logged safely.
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl Credentials {
    /// Create credentials for a named target
    pub fn new(
        server: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
        }
    }
}

/// Factory side of the transport: physical connect + global teardown
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a physical connection using the stored credentials
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn TransportHandle>>;

    /// Reclaim any driver-global resources at session shutdown
    async fn global_cleanup(&self) {}
}

/// One live physical connection
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Switch the connection to the given database
    async fn select_database(&self, database: &str) -> Result<()>;

    /// Execute a literal statement, leaving its rows pending on the handle
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Number of result columns of the pending statement (0 = no result set)
    async fn column_count(&self) -> usize;

    /// Fetch the next pending row, or `None` once the result is exhausted
    async fn next_row(&self) -> Result<Option<TextRow>>;

    /// Escape a raw string for embedding in a literal statement
    async fn escape(&self, raw: &str) -> Result<String>;

    /// Close the physical connection
    async fn disconnect(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn TransportHandle + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn TransportHandle>")
    }
}

/// Escape a string for a literal SQL context by doubling both single and
/// double quotes. Worst case output is twice the input length.
pub fn escape_quotes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() * 2);
    for c in raw.chars() {
        if c == '\'' || c == '"' {
            out.push(c);
        }
        out.push(c);
    }
    out
}

/// Inverse of [`escape_quotes`]: collapse doubled quote characters
pub fn unescape_quotes(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if (c == '\'' || c == '"') && chars.peek() == Some(&c) {
            chars.next();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_both_quote_kinds() {
        assert_eq!(escape_quotes("O'Brien \"test\""), "O''Brien \"\"test\"\"");
        assert_eq!(escape_quotes("plain"), "plain");
        assert_eq!(escape_quotes(""), "");
    }

    #[test]
    fn test_escape_round_trip() {
        let raw = "O'Brien \"test\"";
        assert_eq!(unescape_quotes(&escape_quotes(raw)), raw);

        let raw = "''already'' \"\"doubled\"\"";
        assert_eq!(unescape_quotes(&escape_quotes(raw)), raw);
    }

    #[test]
    fn test_escape_leaves_other_chars() {
        let raw = "a\\b\0c%_;--";
        assert_eq!(escape_quotes(raw), raw);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("db1:1433", "ftp", "s3cret", "ftpusers");
        let dbg = format!("{:?}", creds);
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("ftp"));
        assert!(dbg.contains("db1:1433"));
    }
}
