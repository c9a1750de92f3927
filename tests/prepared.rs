mod common;

use common::*;
use zero_vertica::{Conn, Error, Value};

fn parse_and_describe() -> Vec<Vec<u8>> {
    vec![
        frame(b'1', b""),
        frame(b't', b"\x00\x02\x00\x00\x00\x06\x00\x00\x00\x05"),
        row_description(&[("id", 6), ("name", 9)]),
        ready(b'I'),
    ]
}

#[test]
fn prepare_execute_close() {
    let mut frames = script(parse_and_describe());
    frames.extend([
        frame(b'2', b""),
        data_row(&[Some("1"), Some("ann")]),
        data_row(&[Some("2"), None]),
        command_complete("SELECT 2"),
        ready(b'I'),
        frame(b'3', b""),
        ready(b'I'),
    ]);
    let (stream, written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    written.clear();

    let statement = conn
        .prepare("SELECT id, name FROM users WHERE id > ? AND active = ?")
        .unwrap();
    assert_eq!(statement.name(), "s1");
    assert_eq!(statement.param_types(), &[6, 5]);
    assert_eq!(written.tags(), b"PDSH");
    written.clear();

    let result = conn
        .execute(&statement, &[Value::Integer(0), Value::Bool(true)])
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(result.fetch(0, "name").unwrap(), &Value::Text("ann".into()));
    assert_eq!(result.fetch(-1, "name").unwrap(), &Value::Null);

    let messages = written.messages();
    let tags: Vec<u8> = messages.iter().map(|(tag, _)| *tag).collect();
    assert_eq!(tags, b"BESH");
    let mut bind = b"\0s1\0\x00\x02\x00\x00\x00\x00\x00\x02\x00\x00\x00\x06\x00\x00\x00\x05".to_vec();
    bind.extend_from_slice(b"\x00\x00\x00\x010\x00\x00\x00\x011\x00\x00");
    assert_eq!(messages[0].1, bind);
    written.clear();

    conn.close_statement(&statement).unwrap();
    assert_eq!(written.tags(), b"CS");
}

#[test]
fn statement_names_count_up() {
    let mut frames = script(parse_and_describe());
    frames.extend(parse_and_describe());
    let (stream, _written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();

    assert_eq!(conn.prepare("SELECT 1").unwrap().name(), "s1");
    assert_eq!(conn.prepare("SELECT 2").unwrap().name(), "s2");
}

#[test]
fn wrong_parameter_count_never_reaches_the_server() {
    let (stream, written) = scripted(&script(parse_and_describe()), Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    let statement = conn.prepare("SELECT 1").unwrap();
    written.clear();

    let err = conn.execute(&statement, &[Value::Integer(1)]).unwrap_err();
    assert!(matches!(err, Error::InvalidUsage(_)));
    assert!(written.bytes().is_empty());
    assert!(conn.is_open());
}

#[test]
fn prepare_error_carries_sql() {
    let frames = script(vec![
        error_response("42703", "Column \"nope\" does not exist"),
        ready(b'I'),
    ]);
    let (stream, _written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();

    let err = conn.prepare("SELECT nope FROM t").unwrap_err();
    let query_error = err.query_error().unwrap();
    assert_eq!(query_error.sql, "SELECT nope FROM t");
    assert_eq!(query_error.fields.message(), Some("Column \"nope\" does not exist"));
    assert!(conn.is_open());
}

#[test]
fn unknown_column_type_is_reported() {
    let frames = script(vec![
        frame(b'1', b""),
        frame(b't', b"\x00\x00"),
        row_description(&[("geo", 9999)]),
        ready(b'I'),
    ]);
    let (stream, _written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();

    assert!(matches!(
        conn.prepare("SELECT geo FROM places"),
        Err(Error::UnknownType(9999))
    ));
    assert!(conn.is_open());
}
