//! A scripted in-memory server for driving `Conn` without a database.

#![allow(dead_code)]

use std::io::{self, Cursor, Read, Write};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex};

use zero_vertica::{Duplex, Opts, Stream};

/// Bytes written by the client.
#[derive(Clone)]
pub struct Written(Arc<Mutex<Recorded>>);

struct Recorded {
    bytes: Vec<u8>,
    /// The buffer still starts with the untagged startup message
    has_startup: bool,
}

impl Default for Written {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Recorded {
            bytes: Vec::new(),
            has_startup: true,
        })))
    }
}

impl Written {
    fn record(&self, buf: &[u8]) {
        self.0.lock().unwrap().bytes.extend_from_slice(buf);
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().bytes.clone()
    }

    /// Tagged messages, skipping the startup message if it was not cleared.
    pub fn messages(&self) -> Vec<(u8, Vec<u8>)> {
        let (bytes, has_startup) = {
            let recorded = self.0.lock().unwrap();
            (recorded.bytes.clone(), recorded.has_startup)
        };
        let mut rest = &bytes[..];
        if has_startup && rest.len() >= 4 {
            let startup_len = u32::from_be_bytes(rest[..4].try_into().unwrap()) as usize;
            rest = &rest[startup_len..];
        }
        let mut messages = Vec::new();
        while !rest.is_empty() {
            let tag = rest[0];
            let len = u32::from_be_bytes(rest[1..5].try_into().unwrap()) as usize;
            messages.push((tag, rest[5..1 + len].to_vec()));
            rest = &rest[1 + len..];
        }
        messages
    }

    pub fn tags(&self) -> Vec<u8> {
        self.messages().into_iter().map(|(tag, _)| tag).collect()
    }

    pub fn clear(&self) {
        let mut recorded = self.0.lock().unwrap();
        recorded.bytes.clear();
        recorded.has_startup = false;
    }
}

/// What the server does once its script runs out.
#[derive(Clone, Copy)]
pub enum Ending {
    Eof,
    Timeout,
}

/// Replays canned backend bytes and records what the client writes.
pub struct ScriptedServer {
    input: Cursor<Vec<u8>>,
    ending: Ending,
    written: Written,
}

impl Read for ScriptedServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.input.read(buf)?;
        match (n, self.ending) {
            (0, Ending::Timeout) if !buf.is_empty() => Err(io::ErrorKind::WouldBlock.into()),
            _ => Ok(n),
        }
    }
}

impl Write for ScriptedServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.record(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Duplex for ScriptedServer {}

pub fn scripted(frames: &[Vec<u8>], ending: Ending) -> (Stream, Written) {
    let written = Written::default();
    let server = ScriptedServer {
        input: Cursor::new(frames.concat()),
        ending,
        written: written.clone(),
    };
    (Stream::custom(server), written)
}

/// A server whose bytes are fed by the test while the client waits.
pub struct GatedServer {
    chunks: Receiver<Vec<u8>>,
    pending: Cursor<Vec<u8>>,
    written: Written,
}

impl Read for GatedServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let n = self.pending.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            match self.chunks.recv() {
                Ok(chunk) => self.pending = Cursor::new(chunk),
                Err(_) => return Ok(0),
            }
        }
    }
}

impl Write for GatedServer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.record(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Duplex for GatedServer {}

pub fn gated() -> (Stream, Sender<Vec<u8>>, Written) {
    let (sender, chunks) = channel();
    let written = Written::default();
    let server = GatedServer {
        chunks,
        pending: Cursor::new(Vec::new()),
        written: written.clone(),
    };
    (Stream::custom(server), sender, written)
}

pub fn opts() -> Opts {
    Opts {
        user: "dbadmin".into(),
        database: Some("docker".into()),
        auto_reconnect: false,
        send_client_info: false,
        ..Opts::default()
    }
}

pub fn frame(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(&(payload.len() as u32 + 4).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn auth(code: u32, extra: &[u8]) -> Vec<u8> {
    let mut payload = code.to_be_bytes().to_vec();
    payload.extend_from_slice(extra);
    frame(b'R', &payload)
}

pub fn parameter_status(name: &str, value: &str) -> Vec<u8> {
    frame(b'S', format!("{name}\0{value}\0").as_bytes())
}

pub fn backend_key(pid: u32, secret: u32) -> Vec<u8> {
    let mut payload = pid.to_be_bytes().to_vec();
    payload.extend_from_slice(&secret.to_be_bytes());
    frame(b'K', &payload)
}

pub fn ready(status: u8) -> Vec<u8> {
    frame(b'Z', &[status])
}

/// Columns as `(name, type oid)`, text format.
pub fn row_description(columns: &[(&str, u32)]) -> Vec<u8> {
    let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
    for (name, oid) in columns {
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
        payload.extend_from_slice(&oid.to_be_bytes());
        payload.extend_from_slice(&(-1i16).to_be_bytes());
        payload.extend_from_slice(&(-1i32).to_be_bytes());
        payload.extend_from_slice(&0i16.to_be_bytes());
    }
    frame(b'T', &payload)
}

pub fn data_row(values: &[Option<&str>]) -> Vec<u8> {
    let mut payload = (values.len() as u16).to_be_bytes().to_vec();
    for value in values {
        match value {
            Some(text) => {
                payload.extend_from_slice(&(text.len() as i32).to_be_bytes());
                payload.extend_from_slice(text.as_bytes());
            }
            None => payload.extend_from_slice(&(-1i32).to_be_bytes()),
        }
    }
    frame(b'D', &payload)
}

pub fn command_complete(tag: &str) -> Vec<u8> {
    frame(b'C', format!("{tag}\0").as_bytes())
}

pub fn error_response(sqlstate: &str, message: &str) -> Vec<u8> {
    frame(
        b'E',
        format!("SERROR\0C{sqlstate}\0M{message}\0\0").as_bytes(),
    )
}

pub fn notice(message: &str) -> Vec<u8> {
    frame(b'N', format!("SNOTICE\0M{message}\0\0").as_bytes())
}

pub fn copy_in_response() -> Vec<u8> {
    frame(b'G', &[0, 0, 0])
}

/// AuthenticationOk through the first ReadyForQuery.
pub fn handshake() -> Vec<Vec<u8>> {
    vec![
        auth(0, &[]),
        parameter_status("server_version", "v24.1.0"),
        backend_key(4242, 99),
        ready(b'I'),
    ]
}

/// Handshake frames followed by `frames`.
pub fn script(frames: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    let mut all = handshake();
    all.extend(frames);
    all
}
