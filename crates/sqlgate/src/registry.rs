//! Connection registry for sqlgate
//!
//! An ordered cache of named connection descriptors. The number of named
//! connections is expected to stay small (tens, not thousands), so lookups
//! are a linear scan over a `Vec`. Names are unique; entries are never
//! deleted during a session, only force-closed at shutdown.
//!
//! A descriptor's logical reference count is split into two independent
//! parts: `holders` counts explicit opens, and `keepalive` is the single
//! lease held by an armed idle timer. The physical connection stays up
//! while either is nonzero.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::{Credentials, TransportHandle};

/// Environment variable consulted when a connection target names no host
pub const DSQUERY_ENV: &str = "DSQUERY";

/// Stored configuration and live state for one named connection
pub struct ConnectionEntry {
    pub(crate) name: String,
    pub(crate) credentials: Credentials,
    /// Idle seconds before forced close; 0 disables the timer
    pub(crate) ttl_secs: u64,
    /// Explicit open holds
    pub(crate) holders: u32,
    /// Whether an armed idle timer holds its own lease
    pub(crate) keepalive: bool,
    /// Armed idle-timer task, present only while open with ttl > 0
    pub(crate) timer: Option<JoinHandle<()>>,
    /// Physical connection, present iff the reference count is positive
    pub(crate) handle: Option<Box<dyn TransportHandle>>,
}

impl ConnectionEntry {
    fn new(name: String, credentials: Credentials, ttl_secs: u64) -> Self {
        Self {
            name,
            credentials,
            ttl_secs,
            holders: 0,
            keepalive: false,
            timer: None,
            handle: None,
        }
    }

    /// Connection name (unique registry key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical reference count: explicit holders plus the timer lease
    pub fn ref_count(&self) -> u32 {
        self.holders + u32::from(self.keepalive)
    }

    /// Whether a physical connection is currently established
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Snapshot the entry for callers and diagnostics
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            name: self.name.clone(),
            ref_count: self.ref_count(),
            open: self.is_open(),
            timer_armed: self.timer.is_some(),
            ttl_secs: self.ttl_secs,
        }
    }
}

impl std::fmt::Debug for ConnectionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntry")
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .field("ttl_secs", &self.ttl_secs)
            .field("holders", &self.holders)
            .field("keepalive", &self.keepalive)
            .field("timer_armed", &self.timer.is_some())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Point-in-time view of one descriptor's lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Connection name
    pub name: String,
    /// Logical reference count (explicit holders + timer lease)
    pub ref_count: u32,
    /// Whether the physical connection is established
    pub open: bool,
    /// Whether an idle timer is armed
    pub timer_armed: bool,
    /// Configured idle time-to-live in seconds (0 = none)
    pub ttl_secs: u64,
}

/// Ordered collection of named connection descriptors
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: Vec<ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new named connection. Fails with `DuplicateConnection`
    /// if the name is taken; the existing descriptor is left untouched.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        credentials: Credentials,
        ttl_secs: u64,
    ) -> Result<&ConnectionEntry> {
        let name = name.into();
        if self.lookup(&name).is_some() {
            return Err(Error::duplicate_connection(name));
        }
        self.entries
            .push(ConnectionEntry::new(name, credentials, ttl_secs));
        Ok(self.entries.last().expect("entry just pushed"))
    }

    /// Find a descriptor by name
    pub fn lookup(&self, name: &str) -> Option<&ConnectionEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn lookup_mut(&mut self, name: &str) -> Option<&mut ConnectionEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// Borrow the live handle of an open connection
    pub(crate) fn handle(&self, name: &str) -> Result<&dyn TransportHandle> {
        let entry = self
            .lookup(name)
            .ok_or_else(|| Error::unknown_connection(name))?;
        entry
            .handle
            .as_deref()
            .ok_or_else(|| Error::transport(format!("connection '{}' is not open", name)))
    }

    /// Iterate all descriptors in definition order
    pub fn entries(&self) -> impl Iterator<Item = &ConnectionEntry> {
        self.entries.iter()
    }

    /// Names of all descriptors, in definition order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Number of registered descriptors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no connections have been defined
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split a connection target of the form `db[@host]` into
/// `(database, server)`. Without a host part, the `DSQUERY` environment
/// variable supplies the server; if that is also absent the target is
/// unusable and a fatal `MissingHost` error is returned.
pub fn parse_target(info: &str) -> Result<(String, String)> {
    if let Some((db, server)) = info.split_once('@') {
        return Ok((db.to_string(), server.to_string()));
    }

    warn!(target_info = info, "no host specified, checking {}", DSQUERY_ENV);
    match std::env::var(DSQUERY_ENV) {
        Ok(server) => Ok((info.to_string(), server)),
        Err(_) => Err(Error::MissingHost {
            env_var: DSQUERY_ENV,
        }),
    }
}

/// Parse a time-to-live argument. Non-numeric or non-positive values
/// disable the timer.
pub fn parse_ttl(arg: &str) -> u64 {
    arg.parse::<i64>().map(|t| t.max(0)).unwrap_or(0) as u64
}
