//! Scripted mock transport shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use sqlgate::prelude::*;

/// Scripted outcome of one execute call
pub struct ScriptedResult {
    pub columns: usize,
    pub rows: Vec<TextRow>,
    pub fail: bool,
}

impl ScriptedResult {
    /// A result set with the given columns and rows
    pub fn table(columns: usize, rows: Vec<TextRow>) -> Self {
        Self {
            columns,
            rows,
            fail: false,
        }
    }

    /// A statement that produces no result set
    pub fn none() -> Self {
        Self {
            columns: 0,
            rows: Vec::new(),
            fail: false,
        }
    }

    /// A statement that fails at execution
    pub fn failure() -> Self {
        Self {
            columns: 0,
            rows: Vec::new(),
            fail: true,
        }
    }
}

/// Shared observable state of the mock transport
#[derive(Default)]
pub struct MockState {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub cleanups: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub fail_select_db: AtomicBool,
    pub script: Mutex<VecDeque<ScriptedResult>>,
    pub statements: Mutex<Vec<String>>,
    pub databases: Mutex<Vec<String>>,
}

impl MockState {
    /// Queue the outcome of the next execute call
    pub async fn push_result(&self, result: ScriptedResult) {
        self.script.lock().await.push_back(result);
    }

    /// Statements executed so far, in order
    pub async fn executed(&self) -> Vec<String> {
        self.statements.lock().await.clone()
    }
}

/// Transport whose connections serve pre-scripted results
#[derive(Default)]
pub struct MockTransport {
    pub state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    pub async fn push_result(&self, result: ScriptedResult) {
        self.state.script.lock().await.push_back(result);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _credentials: &Credentials) -> sqlgate::Result<Box<dyn TransportHandle>> {
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::transport("connection refused"));
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockHandle {
            state: Arc::clone(&self.state),
            pending: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    async fn global_cleanup(&self) {
        self.state.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MockHandle {
    state: Arc<MockState>,
    pending: Mutex<Option<(usize, VecDeque<TextRow>)>>,
    closed: AtomicBool,
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn select_database(&self, database: &str) -> sqlgate::Result<()> {
        if self.state.fail_select_db.load(Ordering::SeqCst) {
            return Err(Error::transport("cannot use database"));
        }
        self.state.databases.lock().await.push(database.to_string());
        Ok(())
    }

    async fn execute(&self, sql: &str) -> sqlgate::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::transport("connection is closed"));
        }
        self.state.statements.lock().await.push(sql.to_string());

        let scripted = self
            .state
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(ScriptedResult::none);
        if scripted.fail {
            return Err(Error::transport("execute failed"));
        }
        *self.pending.lock().await = Some((scripted.columns, scripted.rows.into()));
        Ok(())
    }

    async fn column_count(&self) -> usize {
        self.pending
            .lock()
            .await
            .as_ref()
            .map(|(columns, _)| *columns)
            .unwrap_or(0)
    }

    async fn next_row(&self) -> sqlgate::Result<Option<TextRow>> {
        Ok(self
            .pending
            .lock()
            .await
            .as_mut()
            .and_then(|(_, rows)| rows.pop_front()))
    }

    async fn escape(&self, raw: &str) -> sqlgate::Result<String> {
        Ok(escape_quotes(raw))
    }

    async fn disconnect(&self) -> sqlgate::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Convenience: a session over a fresh mock transport with one defined
/// connection named `default` targeting `ftpusers@db1`
pub async fn session_with_connection(ttl: Option<&str>) -> (SqlSession, Arc<MockState>) {
    let transport = MockTransport::new();
    let state = transport.state();
    let session = SqlSession::new(Arc::new(transport));
    session
        .define_connection("default", "ftp", "secret", "ftpusers@db1", ttl)
        .await
        .expect("define");
    (session, state)
}

/// Shorthand for an owned text cell
pub fn cell(s: &str) -> Option<String> {
    Some(s.to_string())
}
