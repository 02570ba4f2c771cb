//! Tests for the command-protocol surface: name parsing, arity
//! validation and dispatch routing

mod common;

use common::{cell, session_with_connection, ScriptedResult};
use sqlgate::prelude::*;

async fn dispatch_named(
    session: &SqlSession,
    name: &str,
    args: &[&str],
) -> sqlgate::Result<CommandOutput> {
    let command: CommandName = name.parse()?;
    session.dispatch(command, args).await
}

// ==================== Name parsing ====================

#[test]
fn test_command_table_names() {
    assert_eq!("open".parse::<CommandName>().unwrap(), CommandName::Open);
    assert_eq!(
        "define-connection".parse::<CommandName>().unwrap(),
        CommandName::DefineConnection
    );
    assert_eq!(
        "escape-string".parse::<CommandName>().unwrap(),
        CommandName::EscapeString
    );
    assert!("drop-table".parse::<CommandName>().is_err());
    assert_eq!(CommandName::ALL.len(), 12);
}

// ==================== Arity validation ====================

#[tokio::test]
async fn test_dispatch_arity_errors() {
    let (session, _state) = session_with_connection(None).await;

    let cases: &[(&str, &[&str])] = &[
        ("open", &[]),
        ("close", &[]),
        ("close", &["default", "1", "extra"]),
        ("define-connection", &["only", "three", "args"]),
        ("select", &["default"]),
        ("insert", &["default", "t", "f"]),
        ("update", &["default"]),
        ("query", &["default"]),
        ("query", &["default", "SELECT 1", "extra"]),
        ("escape-string", &["default"]),
        ("procedure", &["default", "proc_only"]),
    ];
    for (name, args) in cases {
        let err = dispatch_named(&session, name, args).await.unwrap_err();
        assert_eq!(
            err.kind(),
            ErrorKind::BadRequest,
            "command {} with {} args",
            name,
            args.len()
        );
    }
}

// ==================== Routing ====================

#[tokio::test]
async fn test_dispatch_open_close_cycle() {
    let (session, _state) = session_with_connection(None).await;

    assert_eq!(
        dispatch_named(&session, "open", &["default"]).await.unwrap(),
        CommandOutput::Done
    );
    assert_eq!(session.status("default").await.unwrap().ref_count, 1);

    assert_eq!(
        dispatch_named(&session, "close", &["default"]).await.unwrap(),
        CommandOutput::Done
    );
    assert_eq!(session.status("default").await.unwrap().ref_count, 0);
}

#[tokio::test]
async fn test_dispatch_close_force_flag() {
    let (session, _state) = session_with_connection(Some("30")).await;

    session.open("default").await.unwrap();
    assert_eq!(session.status("default").await.unwrap().ref_count, 2);

    // a non-empty second argument forces the close
    dispatch_named(&session, "close", &["default", "1"])
        .await
        .unwrap();
    let status = session.status("default").await.unwrap();
    assert_eq!(status.ref_count, 0);
    assert!(!status.open);
}

#[tokio::test]
async fn test_dispatch_define_connection() {
    let (session, _state) = session_with_connection(None).await;

    let out = dispatch_named(
        &session,
        "define-connection",
        &["logs", "ftp", "secret", "ftplog@db2", "45"],
    )
    .await
    .unwrap();
    assert_eq!(out, CommandOutput::Done);

    let status = session.status("logs").await.unwrap();
    assert_eq!(status.ttl_secs, 45);
}

#[tokio::test]
async fn test_dispatch_select_returns_table() {
    let (session, state) = session_with_connection(None).await;
    state
        .push_result(ScriptedResult::table(1, vec![vec![cell("aah")]]))
        .await;

    let out = dispatch_named(&session, "select", &["default", "users", "userid"])
        .await
        .unwrap();
    let table = out.table().expect("select yields a table");
    assert_eq!(table.get(0, 0), Some("aah"));
}

#[tokio::test]
async fn test_dispatch_query_without_columns_is_done() {
    let (session, state) = session_with_connection(None).await;
    state.push_result(ScriptedResult::none()).await;

    let out = dispatch_named(&session, "query", &["default", "DELETE FROM users"])
        .await
        .unwrap();
    assert_eq!(out, CommandOutput::Done);
}

#[tokio::test]
async fn test_dispatch_escape_string() {
    let (session, _state) = session_with_connection(None).await;

    let out = dispatch_named(&session, "escape-string", &["default", "O'Brien"])
        .await
        .unwrap();
    assert_eq!(out.text(), Some("O''Brien"));
}

#[tokio::test]
async fn test_dispatch_unsupported_commands() {
    let (session, _state) = session_with_connection(None).await;

    let err = dispatch_named(&session, "procedure", &["default", "sp_count", "exec sp_count"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);

    // check-auth is unsupported regardless of arguments
    let err = dispatch_named(&session, "check-auth", &["default", "clear", "hash"])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    let err = dispatch_named(&session, "check-auth", &[]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test]
async fn test_dispatch_identify() {
    let (session, _state) = session_with_connection(None).await;

    let out = dispatch_named(&session, "identify", &[]).await.unwrap();
    let table = out.table().expect("identify yields a table");
    assert_eq!((table.rows(), table.columns()), (1, 2));
    assert_eq!(table.get(0, 0), Some(BACKEND_IDENT));
}

#[tokio::test]
async fn test_dispatch_errors_carry_tags() {
    let (session, _state) = session_with_connection(None).await;

    let err = dispatch_named(&session, "open", &["missing"]).await.unwrap_err();
    assert_eq!(err.kind().to_string(), "unknown_connection");
    assert!(err.to_string().contains("missing"));
}
