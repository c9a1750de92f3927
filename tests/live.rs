//! Tests against a running Vertica server.
//!
//! Run with `VERTICA_URL=vertica://dbadmin@localhost:5433/docker cargo test -- --ignored`.

use zero_vertica::{Conn, Opts, Value};

fn connect() -> Conn {
    let url = std::env::var("VERTICA_URL")
        .unwrap_or_else(|_| "vertica://dbadmin@localhost:5433/docker".to_string());
    let mut opts = Opts::try_from(url.as_str()).unwrap();
    opts.interruptable = true;
    Conn::new(opts).unwrap()
}

#[test]
#[ignore]
fn live_select() {
    let conn = connect();
    let result = conn.query("SELECT 1 AS one, 'a' AS two").unwrap();
    assert_eq!(result.fetch(0, "one").unwrap(), &Value::Integer(1));
    assert_eq!(result.fetch(0, "two").unwrap(), &Value::Text("a".into()));
}

#[test]
#[ignore]
fn live_syntax_error_keeps_session() {
    let conn = connect();
    let err = conn.query("SELEC 1").unwrap_err();
    assert_eq!(err.sqlstate(), Some("42601"));
    assert!(conn.query("SELECT 1").is_ok());
}

#[test]
#[ignore]
fn live_prepared_round_trip() {
    let conn = connect();
    let statement = conn.prepare("SELECT ? + 1 AS n").unwrap();
    let result = conn.execute(&statement, &[Value::Integer(41)]).unwrap();
    assert_eq!(result.value().unwrap().as_i64(), Some(42));
    conn.close_statement(&statement).unwrap();
}

#[test]
#[ignore]
fn live_copy() {
    let conn = connect();
    conn.query("CREATE LOCAL TEMP TABLE copy_target (a INT, b VARCHAR) ON COMMIT PRESERVE ROWS")
        .unwrap();
    let data: &[u8] = b"1|x\n2|y\n";
    let result = conn
        .copy_from_reader("COPY copy_target FROM STDIN", data)
        .unwrap();
    assert_eq!(result.rows_affected(), Some(2));
}

#[test]
#[ignore]
fn live_interrupt_closes_session() {
    let conn = connect();
    assert!(conn.is_interruptable());
    conn.interrupt().unwrap();
    assert!(conn.query("SELECT 1").is_err());
}
