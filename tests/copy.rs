mod common;

use std::io::Write;

use common::*;
use zero_vertica::{Conn, Error};

#[test]
fn copy_streams_data_then_done() {
    let frames = script(vec![
        copy_in_response(),
        command_complete("COPY 2"),
        ready(b'I'),
    ]);
    let (stream, written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    written.clear();

    let result = conn
        .copy("COPY t FROM STDIN", |writer| {
            writer.send(b"1|a\n")?;
            writer.write_all(b"2|b\n")?;
            assert_eq!(writer.bytes_sent(), 8);
            Ok(())
        })
        .unwrap();
    assert_eq!(result.rows_affected(), Some(2));

    let messages = written.messages();
    let tags: Vec<u8> = messages.iter().map(|(tag, _)| *tag).collect();
    assert_eq!(tags, b"Qddc");
    assert_eq!(messages[1].1, b"1|a\n");
    assert_eq!(messages[2].1, b"2|b\n");
}

#[test]
fn copy_from_reader() {
    let frames = script(vec![
        copy_in_response(),
        command_complete("COPY 3"),
        ready(b'I'),
    ]);
    let (stream, written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    written.clear();

    let data: &[u8] = b"1\n2\n3\n";
    let result = conn.copy_from_reader("COPY t FROM STDIN", data).unwrap();
    assert_eq!(result.rows_affected(), Some(3));

    let sent: Vec<u8> = written
        .messages()
        .into_iter()
        .filter(|(tag, _)| *tag == b'd')
        .flat_map(|(_, payload)| payload)
        .collect();
    assert_eq!(sent, data);
    assert_eq!(written.tags().last(), Some(&b'c'));
}

#[test]
fn copy_without_handler_fails_the_copy() {
    let frames = script(vec![
        copy_in_response(),
        error_response("08000", "COPY from stdin failed: no handler provided"),
        ready(b'I'),
    ]);
    let (stream, written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    written.clear();

    let err = conn.query("COPY t FROM STDIN").unwrap_err();
    match &err {
        Error::CopyAborted { message, server } => {
            assert_eq!(message, "no handler provided");
            assert_eq!(server.as_ref().unwrap().sqlstate(), Some("08000"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(err.sqlstate(), Some("08000"));

    let messages = written.messages();
    assert_eq!(messages[1], (b'f', b"no handler provided\0".to_vec()));
    assert!(conn.is_open());
}

#[test]
fn handler_error_aborts_the_copy() {
    let frames = script(vec![
        copy_in_response(),
        error_response("57014", "COPY: aborted by client"),
        ready(b'I'),
    ]);
    let (stream, written) = scripted(&frames, Ending::Eof);
    let conn = Conn::with_stream(stream, opts()).unwrap();
    written.clear();

    let err = conn
        .copy("COPY t FROM STDIN", |writer| {
            writer.send(b"1|a\n")?;
            Err(Error::InvalidUsage("source file vanished".into()))
        })
        .unwrap_err();

    let Error::CopyAborted { message, server } = err else {
        panic!("expected CopyAborted");
    };
    assert!(message.contains("source file vanished"));
    assert!(server.is_some());

    assert_eq!(written.tags(), b"Qdf");
    assert!(conn.is_open());
}
