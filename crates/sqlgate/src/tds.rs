//! TDS transport implementation for sqlgate
//!
//! Drives Microsoft SQL Server / Sybase-compatible servers over the TDS
//! protocol via tiberius. Implements the [`Transport`] seam:
//! - connect with SQL Server authentication and an application name
//! - database selection via `USE`
//! - statement execution with the first result set buffered as text rows
//! - cursor-style `column_count`/`next_row` over the buffered result
//!
//! tiberius processes results in result-set granularity, so `execute`
//! drains the wire into a pending buffer and the row cursor serves from
//! it. Only the first result set is kept; trailing result sets are
//! consumed and discarded.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::collections::VecDeque;
use tiberius::{AuthMethod, Client, Config, QueryItem};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::transport::{escape_quotes, Credentials, TextRow, Transport, TransportHandle};

/// Default TDS port when the server address names none
const DEFAULT_PORT: u16 = 1433;

type TdsClient = Client<Compat<TcpStream>>;

/// TDS transport factory
#[derive(Debug, Clone)]
pub struct TdsTransport {
    application_name: String,
    trust_cert: bool,
}

impl Default for TdsTransport {
    fn default() -> Self {
        Self {
            application_name: "sqlgate".to_string(),
            trust_cert: false,
        }
    }
}

impl TdsTransport {
    /// Create a transport with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name reported to the server at login
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Trust the server certificate without validation
    pub fn with_trust_cert(mut self, trust: bool) -> Self {
        self.trust_cert = trust;
        self
    }
}

/// Split a server address into host and port, defaulting the port
fn split_server(server: &str) -> (&str, u16) {
    match server.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (server, DEFAULT_PORT),
        },
        None => (server, DEFAULT_PORT),
    }
}

#[async_trait]
impl Transport for TdsTransport {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn TransportHandle>> {
        let (host, port) = split_server(&credentials.server);

        let mut config = Config::new();
        config.host(host);
        config.port(port);
        config.authentication(AuthMethod::sql_server(
            &credentials.user,
            &credentials.password,
        ));
        config.application_name(&self.application_name);
        if self.trust_cert {
            config.trust_cert();
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| Error::transport_with_source("failed to connect", e))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| Error::transport_with_source("failed to log in", e))?;

        debug!(server = %credentials.server, user = %credentials.user, "tds connection established");
        Ok(Box::new(TdsHandle {
            client: Mutex::new(Some(client)),
            pending: Mutex::new(None),
        }))
    }

    async fn global_cleanup(&self) {
        // tiberius clients release their resources on close/drop; there
        // is no driver-global state to reclaim
        trace!("tds global cleanup");
    }
}

/// Buffered result of the most recent statement
struct PendingRows {
    columns: usize,
    rows: VecDeque<TextRow>,
}

/// One live TDS connection
pub struct TdsHandle {
    client: Mutex<Option<TdsClient>>,
    pending: Mutex<Option<PendingRows>>,
}

impl TdsHandle {
    async fn run(&self, sql: &str) -> Result<PendingRows> {
        let mut guard = self.client.lock().await;
        let client = guard
            .as_mut()
            .ok_or_else(|| Error::transport("connection is closed"))?;

        let mut stream = client
            .simple_query(sql)
            .await
            .map_err(|e| Error::transport_with_source("execute failed", e))?;

        let mut columns = 0;
        let mut rows = VecDeque::new();
        let mut result_sets = 0;
        while let Some(item) = stream
            .try_next()
            .await
            .map_err(|e| Error::transport_with_source("row fetch failed", e))?
        {
            match item {
                QueryItem::Metadata(meta) => {
                    result_sets += 1;
                    if result_sets == 1 {
                        columns = meta.columns().len();
                    }
                }
                QueryItem::Row(row) => {
                    if result_sets <= 1 {
                        rows.push_back(row_to_text(&row));
                    }
                }
            }
        }

        Ok(PendingRows { columns, rows })
    }
}

#[async_trait]
impl TransportHandle for TdsHandle {
    async fn select_database(&self, database: &str) -> Result<()> {
        // bracket-quote the identifier; `]` escapes as `]]`
        let sql = format!("USE [{}]", database.replace(']', "]]"));
        self.run(&sql).await?;
        *self.pending.lock().await = None;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let result = self.run(sql).await?;
        trace!(columns = result.columns, rows = result.rows.len(), "statement executed");
        *self.pending.lock().await = Some(result);
        Ok(())
    }

    async fn column_count(&self) -> usize {
        self.pending
            .lock()
            .await
            .as_ref()
            .map(|p| p.columns)
            .unwrap_or(0)
    }

    async fn next_row(&self) -> Result<Option<TextRow>> {
        Ok(self
            .pending
            .lock()
            .await
            .as_mut()
            .and_then(|p| p.rows.pop_front()))
    }

    async fn escape(&self, raw: &str) -> Result<String> {
        Ok(escape_quotes(raw))
    }

    async fn disconnect(&self) -> Result<()> {
        *self.pending.lock().await = None;
        if let Some(client) = self.client.lock().await.take() {
            client
                .close()
                .await
                .map_err(|e| Error::transport_with_source("close failed", e))?;
        }
        Ok(())
    }
}

/// Convert a tiberius row into bounded text cells.
///
/// Typed probes run in a fixed order, bool before the numeric widths so
/// BIT does not surface through the binary catch-all. Anything without a
/// text rendering becomes NULL.
fn row_to_text(row: &tiberius::Row) -> TextRow {
    (0..row.len()).map(|idx| cell_text(row, idx)).collect()
}

fn cell_text(row: &tiberius::Row, idx: usize) -> Option<String> {
    if let Ok(Some(v)) = row.try_get::<bool, _>(idx) {
        return Some(if v { "1" } else { "0" }.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<u8, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<f32, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<tiberius::numeric::Numeric, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<uuid::Uuid, _>(idx) {
        return Some(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
        return Some(v.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDate, _>(idx) {
        return Some(v.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveTime, _>(idx) {
        return Some(v.format("%H:%M:%S%.3f").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx) {
        return Some(v.format("%Y-%m-%d %H:%M:%S%.3f %z").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<&[u8], _>(idx) {
        return Some(to_hex(v));
    }

    None
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}
