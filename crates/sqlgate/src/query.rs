//! Statement assembly for sqlgate
//!
//! Builds literal query strings from already-tokenized argument lists.
//! Arguments are concatenated verbatim; quoting and escaping are the
//! caller's responsibility (see [`crate::transport::escape_quotes`]).
//!
//! Each builder takes the argument list *without* the leading connection
//! name, pre-validated for arity by the dispatcher.

/// Build a SELECT statement.
///
/// With a single argument, it is a monolithic query body:
/// `["bar FROM usr1 WHERE tmp=1"]` becomes
/// `SELECT bar FROM usr1 WHERE tmp=1`.
///
/// Otherwise the arguments are `[table, select-list, where, limit,
/// extras...]`. An empty where or limit argument is skipped. Any extra
/// argument matching `DISTINCT` (case-insensitive) prefixes the
/// expression. With every clause present the result reads
/// `SELECT DISTINCT TOP <n> <list> FROM <table> WHERE <where>` — the
/// row limit is prefixed before the distinct marker.
pub fn build_select(args: &[&str]) -> String {
    if args.len() == 1 {
        return format!("SELECT {}", args[0]);
    }

    let mut query = format!("{} FROM {}", args[1], args[0]);
    if let Some(clause) = args.get(2).filter(|c| !c.is_empty()) {
        query.push_str(" WHERE ");
        query.push_str(clause);
    }
    if let Some(limit) = args.get(3).filter(|l| !l.is_empty()) {
        query = format!("TOP {} {}", limit, query);
    }
    if args.len() > 4 && args[4..].iter().any(|a| a.eq_ignore_ascii_case("DISTINCT")) {
        query = format!("DISTINCT {}", query);
    }

    format!("SELECT {}", query)
}

/// Build an INSERT statement.
///
/// One argument is a monolithic body (`INSERT <verbatim>`); three
/// arguments are `[table, fields, values]` and become
/// `INSERT INTO <table> (<fields>) VALUES (<values>)`.
pub fn build_insert(args: &[&str]) -> String {
    if args.len() == 1 {
        format!("INSERT {}", args[0])
    } else {
        format!("INSERT INTO {} ({}) VALUES ({})", args[0], args[1], args[2])
    }
}

/// Build an UPDATE statement.
///
/// One argument is a monolithic body (`UPDATE <verbatim>`); otherwise the
/// arguments are `[table, assignments, where]` with the where clause
/// optional and skipped when empty.
pub fn build_update(args: &[&str]) -> String {
    if args.len() == 1 {
        return format!("UPDATE {}", args[0]);
    }

    let mut query = format!("UPDATE {} SET {}", args[0], args[1]);
    if let Some(clause) = args.get(2).filter(|c| !c.is_empty()) {
        query.push_str(" WHERE ");
        query.push_str(clause);
    }
    query
}

/// A raw query is passed through unmodified.
pub fn build_raw(sql: &str) -> String {
    sql.to_string()
}
