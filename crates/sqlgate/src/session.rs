//! Session and command dispatch for sqlgate
//!
//! [`SqlSession`] owns one connection registry and drives it through the
//! adapter's command protocol. All registry mutation is serialized behind
//! a single mutex held for the duration of a command, so an idle-timer
//! expiry can never interleave with a running command — expiry re-enters
//! the same close path used by the explicit close command, behind the
//! same lock.
//!
//! Data commands follow a fixed shape: validate arguments, open the named
//! connection, build and execute the statement, materialize rows when the
//! command returns data, and close the logical connection exactly once —
//! on the error path as well, so the registry never holds a half-open
//! handle after a failure.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::command::{CommandName, CommandOutput};
use crate::error::{Error, Result};
use crate::query;
use crate::registry::{self, ConnectionRegistry, ConnectionStatus};
use crate::result::{self, TabularResult};
use crate::transport::{Credentials, Transport};

/// Identification string reported by the `identify` command
pub const BACKEND_IDENT: &str = concat!("sqlgate/", env!("CARGO_PKG_VERSION"));

/// Command-protocol API version reported by the `identify` command
pub const SQL_API_VERSION: &str = "1.0";

/// Whether a statement's rows are materialized after execution
enum Materialize {
    /// Always drain rows into a table (select)
    Always,
    /// Drain only when the statement produced result columns (query)
    WhenColumns,
    /// The statement returns no rows (insert, update)
    Never,
}

struct SessionInner {
    transport: Arc<dyn Transport>,
    registry: Mutex<ConnectionRegistry>,
}

/// One session's connection state and command handlers.
///
/// Cheap to clone; clones share the same registry. Construct with
/// [`SqlSession::new`] and tear down with [`SqlSession::shutdown`].
#[derive(Clone)]
pub struct SqlSession {
    inner: Arc<SessionInner>,
}

impl SqlSession {
    /// Create a session driving the given transport
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                transport,
                registry: Mutex::new(ConnectionRegistry::new()),
            }),
        }
    }

    /// Route a protocol command to its handler.
    ///
    /// Argument lists include the connection name where the command takes
    /// one, matching the protocol table.
    pub async fn dispatch(&self, command: CommandName, args: &[&str]) -> Result<CommandOutput> {
        debug!(command = %command, argc = args.len(), "dispatch");
        match command {
            CommandName::Open => {
                if args.is_empty() {
                    return Err(Error::bad_request("open needs a connection name"));
                }
                self.open(args[0]).await?;
                Ok(CommandOutput::Done)
            }
            CommandName::Close => {
                if args.is_empty() || args.len() > 2 {
                    return Err(Error::bad_request(
                        "close takes a connection name and an optional force flag",
                    ));
                }
                let force = args.get(1).is_some_and(|a| !a.is_empty());
                self.close(args[0], force).await?;
                Ok(CommandOutput::Done)
            }
            CommandName::Exit => {
                self.shutdown().await;
                Ok(CommandOutput::Done)
            }
            CommandName::DefineConnection => {
                if args.len() < 4 || args.len() > 5 {
                    return Err(Error::bad_request(
                        "define-connection takes name, user, password, target and an optional ttl",
                    ));
                }
                self.define_connection(args[0], args[1], args[2], args[3], args.get(4).copied())
                    .await?;
                Ok(CommandOutput::Done)
            }
            CommandName::Select => Ok(CommandOutput::Table(self.select(args).await?)),
            CommandName::Insert => {
                self.insert(args).await?;
                Ok(CommandOutput::Done)
            }
            CommandName::Update => {
                self.update(args).await?;
                Ok(CommandOutput::Done)
            }
            CommandName::Procedure => {
                if args.len() != 3 {
                    return Err(Error::bad_request(
                        "procedure takes a connection name, procedure name and procedure string",
                    ));
                }
                Err(Error::unsupported("procedure"))
            }
            CommandName::Query => {
                if args.len() != 2 {
                    return Err(Error::bad_request(
                        "query takes a connection name and a statement",
                    ));
                }
                match self.query(args[0], args[1]).await? {
                    Some(table) => Ok(CommandOutput::Table(table)),
                    None => Ok(CommandOutput::Done),
                }
            }
            CommandName::EscapeString => {
                if args.len() != 2 {
                    return Err(Error::bad_request(
                        "escape-string takes a connection name and a string",
                    ));
                }
                Ok(CommandOutput::Text(
                    self.escape_string(args[0], args[1]).await?,
                ))
            }
            CommandName::CheckAuth => Err(Error::unsupported("check-auth")),
            CommandName::Identify => Ok(CommandOutput::Table(self.identify())),
        }
    }

    /// Register a named connection.
    ///
    /// `target` has the form `db[@host]`; without a host the `DSQUERY`
    /// environment variable supplies one, and a missing fallback is a
    /// fatal error. A non-numeric or non-positive `ttl` disables the
    /// idle timer.
    pub async fn define_connection(
        &self,
        name: &str,
        user: &str,
        password: &str,
        target: &str,
        ttl: Option<&str>,
    ) -> Result<()> {
        let (database, server) = registry::parse_target(target)?;
        let ttl_secs = ttl.map(registry::parse_ttl).unwrap_or(0);
        let credentials = Credentials::new(server, user, password, database);

        let mut reg = self.inner.registry.lock().await;
        reg.define(name, credentials.clone(), ttl_secs)?;
        debug!(
            name,
            user,
            server = %credentials.server,
            database = %credentials.database,
            ttl = ttl_secs,
            "connection defined"
        );
        Ok(())
    }

    /// Open (or re-reference) a named connection
    pub async fn open(&self, name: &str) -> Result<()> {
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await
    }

    /// Close a named connection.
    ///
    /// Decrements the reference count; the physical connection goes down
    /// when the count reaches zero or `force` is set. Closing an
    /// already-closed connection is a no-op.
    pub async fn close(&self, name: &str, force: bool) -> Result<()> {
        let mut reg = self.inner.registry.lock().await;
        self.close_locked(&mut reg, name, force).await
    }

    /// Execute a SELECT built from `[name, table, select-list, where,
    /// limit, extras...]` (or the two-argument monolithic form) and
    /// return the materialized table
    pub async fn select(&self, args: &[&str]) -> Result<TabularResult> {
        if args.len() < 2 {
            return Err(Error::bad_request(
                "select needs a connection name and at least one argument",
            ));
        }
        let name = args[0];
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await?;

        let sql = query::build_select(&args[1..]);
        let table = self
            .run_statement(&mut reg, name, &sql, Materialize::Always)
            .await?;
        Ok(table.unwrap_or_else(|| TabularResult::empty(0)))
    }

    /// Execute an INSERT built from `[name, table, fields, values]` or
    /// the two-argument monolithic form
    pub async fn insert(&self, args: &[&str]) -> Result<()> {
        if args.len() != 2 && args.len() != 4 {
            return Err(Error::bad_request(
                "insert takes a connection name plus one or three arguments",
            ));
        }
        let name = args[0];
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await?;

        let sql = query::build_insert(&args[1..]);
        self.run_statement(&mut reg, name, &sql, Materialize::Never)
            .await?;
        Ok(())
    }

    /// Execute an UPDATE built from `[name, table, assignments, where]`
    /// (where optional) or the two-argument monolithic form
    pub async fn update(&self, args: &[&str]) -> Result<()> {
        if args.len() < 2 || args.len() > 4 {
            return Err(Error::bad_request(
                "update takes a connection name plus one to three arguments",
            ));
        }
        let name = args[0];
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await?;

        let sql = query::build_update(&args[1..]);
        self.run_statement(&mut reg, name, &sql, Materialize::Never)
            .await?;
        Ok(())
    }

    /// Execute a raw statement verbatim. Returns a table when the
    /// statement produced result columns, `None` otherwise.
    pub async fn query(&self, name: &str, sql: &str) -> Result<Option<TabularResult>> {
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await?;

        let sql = query::build_raw(sql);
        self.run_statement(&mut reg, name, &sql, Materialize::WhenColumns)
            .await
    }

    /// Escape a raw string through the named connection's transport.
    ///
    /// Opens the connection to obtain the escaping rules and closes it
    /// (one reference-count decrement) before returning.
    pub async fn escape_string(&self, name: &str, raw: &str) -> Result<String> {
        let mut reg = self.inner.registry.lock().await;
        self.open_locked(&mut reg, name).await?;

        let escaped = match reg.handle(name) {
            Ok(handle) => handle.escape(raw).await,
            Err(e) => Err(e),
        };
        match escaped {
            Ok(escaped) => {
                debug!(before = raw, after = %escaped, "escaped string");
                self.close_locked(&mut reg, name, false).await?;
                Ok(escaped)
            }
            Err(e) => {
                self.close_on_error(&mut reg, name).await;
                Err(e)
            }
        }
    }

    /// The backend's identification record: one row of identification
    /// string and API version
    pub fn identify(&self) -> TabularResult {
        TabularResult::from_rows(
            2,
            [vec![
                Some(BACKEND_IDENT.to_string()),
                Some(SQL_API_VERSION.to_string()),
            ]],
        )
    }

    /// Force-close every open connection, then release transport-global
    /// resources. Safe to call more than once.
    pub async fn shutdown(&self) {
        debug!("session shutdown");
        let mut reg = self.inner.registry.lock().await;
        let open: Vec<String> = reg
            .entries()
            .filter(|e| e.ref_count() > 0)
            .map(|e| e.name().to_string())
            .collect();
        for name in open {
            if let Err(e) = self.close_locked(&mut reg, &name, true).await {
                warn!(connection = %name, error = %e, "forced close at shutdown failed");
            }
        }
        drop(reg);
        self.inner.transport.global_cleanup().await;
    }

    /// Snapshot one descriptor's lifecycle state
    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        self.inner
            .registry
            .lock()
            .await
            .lookup(name)
            .map(|e| e.status())
    }

    /// Snapshot every descriptor, in definition order
    pub async fn connections(&self) -> Vec<ConnectionStatus> {
        self.inner
            .registry
            .lock()
            .await
            .entries()
            .map(|e| e.status())
            .collect()
    }

    /// Open a connection with the registry lock already held.
    ///
    /// An already-open connection gains a holder and gets its armed timer
    /// refreshed. A closed one is physically connected and switched to
    /// its database — both failures are fatal for the session — and, when
    /// a ttl is configured, the idle timer takes its own keepalive lease
    /// so that one logical close does not tear the connection down.
    async fn open_locked(&self, reg: &mut ConnectionRegistry, name: &str) -> Result<()> {
        let Some(entry) = reg.lookup_mut(name) else {
            return Err(Error::unknown_connection(name));
        };

        if entry.ref_count() > 0 {
            entry.holders += 1;
            if entry.timer.is_some() {
                let ttl = entry.ttl_secs;
                if let Some(timer) = entry.timer.take() {
                    timer.abort();
                }
                entry.timer = Some(self.arm_timer(name, Duration::from_secs(ttl)));
            }
            debug!(connection = name, count = entry.ref_count(), "connection count");
            return Ok(());
        }

        let credentials = entry.credentials.clone();
        let ttl_secs = entry.ttl_secs;

        let handle = self
            .inner
            .transport
            .connect(&credentials)
            .await
            .map_err(|e| Error::connect_failed(&credentials.server, e.to_string()))?;

        if let Err(e) = handle.select_database(&credentials.database).await {
            // do not leak the half-open handle
            if let Err(de) = handle.disconnect().await {
                warn!(connection = name, error = %de, "disconnect after failed database select");
            }
            return Err(Error::database_select(&credentials.database, e.to_string()));
        }

        let Some(entry) = reg.lookup_mut(name) else {
            return Err(Error::unknown_connection(name));
        };
        entry.handle = Some(handle);
        entry.holders = 1;
        if ttl_secs > 0 {
            entry.keepalive = true;
            entry.timer = Some(self.arm_timer(name, Duration::from_secs(ttl_secs)));
            debug!(connection = name, ttl = ttl_secs, "idle timer armed");
        }
        debug!(connection = name, count = entry.ref_count(), "connection opened");
        Ok(())
    }

    /// Close a connection with the registry lock already held.
    ///
    /// Shared by the explicit close command, the data commands' auto
    /// close, timer expiry and shutdown.
    async fn close_locked(
        &self,
        reg: &mut ConnectionRegistry,
        name: &str,
        force: bool,
    ) -> Result<()> {
        let Some(entry) = reg.lookup_mut(name) else {
            return Err(Error::unknown_connection(name));
        };

        if entry.ref_count() == 0 {
            debug!(connection = name, count = 0u32, "connection count");
            return Ok(());
        }

        if entry.holders > 0 {
            entry.holders -= 1;
        } else {
            entry.keepalive = false;
        }

        if entry.ref_count() == 0 || force {
            if let Some(handle) = entry.handle.take() {
                if let Err(e) = handle.disconnect().await {
                    warn!(connection = name, error = %e, "disconnect failed");
                }
            }
            entry.holders = 0;
            entry.keepalive = false;
            if let Some(timer) = entry.timer.take() {
                timer.abort();
                debug!(connection = name, "idle timer stopped");
            }
            debug!(connection = name, "connection closed");
        }

        debug!(connection = name, count = entry.ref_count(), "connection count");
        Ok(())
    }

    /// Execute a statement on an open connection, optionally materialize
    /// its rows, and close the logical connection exactly once — also on
    /// the failure path.
    async fn run_statement(
        &self,
        reg: &mut ConnectionRegistry,
        name: &str,
        sql: &str,
        materialize: Materialize,
    ) -> Result<Option<TabularResult>> {
        debug!(connection = name, %sql, "query");

        let outcome = async {
            let handle = reg.handle(name)?;
            handle.execute(sql).await?;
            match materialize {
                Materialize::Always => Ok(Some(result::materialize(handle).await?)),
                Materialize::WhenColumns => {
                    if handle.column_count().await > 0 {
                        Ok(Some(result::materialize(handle).await?))
                    } else {
                        Ok(None)
                    }
                }
                Materialize::Never => Ok(None),
            }
        }
        .await;

        match outcome {
            Ok(table) => {
                self.close_locked(reg, name, false).await?;
                Ok(table)
            }
            Err(e) => {
                self.close_on_error(reg, name).await;
                Err(e)
            }
        }
    }

    /// Best-effort close on a command's failure path; the original error
    /// wins over any close failure
    async fn close_on_error(&self, reg: &mut ConnectionRegistry, name: &str) {
        if let Err(e) = self.close_locked(reg, name, false).await {
            warn!(connection = name, error = %e, "close after failed command");
        }
    }

    /// Arm a one-shot idle timer for a connection.
    ///
    /// The task holds only a weak session reference; on expiry it
    /// detaches its own handle and then re-enters the shared close path
    /// with `force = true`. Failures are logged, never propagated.
    fn arm_timer(&self, name: &str, ttl: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let name = name.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let session = SqlSession { inner };

            let mut reg = session.inner.registry.lock().await;
            debug!(connection = %name, "idle timer expired");
            match reg.lookup_mut(&name) {
                // detach this task's own handle so the close path does
                // not abort it mid-close
                Some(entry) => entry.timer = None,
                None => return,
            }
            if let Err(e) = session.close_locked(&mut reg, &name, true).await {
                warn!(connection = %name, error = %e, "idle-timer close failed");
            }
        })
    }
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession").finish_non_exhaustive()
    }
}
