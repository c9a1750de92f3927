//! Synchronous Vertica connection.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use crate::buffer_set::BufferSet;
use crate::error::{Error, ErrorFields, Result};
use crate::opts::{Opts, SESSION_ID_QUERY, SslMode, quote_literal};
use crate::protocol::backend::BackendKeyData;
use crate::protocol::frontend::{CancelRequest, Flush, FrontendMessage, SslRequest, Terminate};
use crate::protocol::types::TransactionStatus;
use crate::result::{ResultSet, RowMode};
use crate::row::Row;
use crate::state::{
    Action, AsyncMessage, CloseStatementStateMachine, ConnectionStateMachine,
    ExecuteStateMachine, Notification, PrepareStateMachine, PreparedStatement,
    SimpleQueryStateMachine, StateMachine, is_blank_sql,
};
use crate::types::Value;

use super::copy::CopyWriter;
use super::stream::Stream;

/// Sent as CopyFail when the server asks for COPY data nobody supplies.
const NO_COPY_HANDLER: &str = "no handler provided";

/// Notices and notifications kept until taken; older ones are dropped first.
const MAX_PENDING: usize = 1024;

type CopyHandler<'a> = dyn FnMut(&mut CopyWriter<'_>) -> Result<()> + 'a;

/// Synchronous Vertica connection.
///
/// A `Conn` can be shared between threads, but runs one operation at a time.
/// An operation started while another is in flight fails immediately with
/// [`Error::Synchronize`]; it never waits.
pub struct Conn {
    opts: Opts,
    session: Mutex<Session>,
    info: Mutex<SessionInfo>,
}

/// State owned by the operation in flight.
struct Session {
    stream: Option<Stream>,
    buffer_set: BufferSet,
    statement_counter: u64,
}

/// State readable while an operation is in flight.
#[derive(Debug, Default)]
struct SessionInfo {
    busy_with: Option<String>,
    open: bool,
    ssl: bool,
    backend_key: Option<BackendKeyData>,
    session_id: Option<String>,
    parameters: HashMap<String, String>,
    transaction_status: Option<TransactionStatus>,
    notices: VecDeque<ErrorFields>,
    notifications: VecDeque<Notification>,
}

impl SessionInfo {
    fn apply(&mut self, message: AsyncMessage) {
        match message {
            AsyncMessage::Notification(notification) => {
                push_bounded(&mut self.notifications, notification);
            }
            AsyncMessage::Notice(fields) => {
                tracing::info!(notice = %fields.error_message(), "server notice");
                push_bounded(&mut self.notices, fields);
            }
            AsyncMessage::ParameterChanged { name, value } => {
                self.parameters.insert(name, value);
            }
            AsyncMessage::BackendKey(key) => self.backend_key = Some(key),
            AsyncMessage::Unknown { tag, len } => {
                tracing::warn!(tag = %char::from(tag), len, "skipped unknown backend message");
            }
        }
    }

    /// Forget everything tied to the server session. Notices and
    /// notifications stay until taken.
    fn clear_session(&mut self) {
        self.open = false;
        self.ssl = false;
        self.backend_key = None;
        self.session_id = None;
        self.parameters.clear();
        self.transaction_status = None;
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, item: T) {
    if queue.len() == MAX_PENDING {
        queue.pop_front();
        tracing::debug!(limit = MAX_PENDING, "dropped the oldest pending server message");
    }
    queue.push_back(item);
}

/// Exclusive access to the session for one operation.
struct Busy<'c> {
    conn: &'c Conn,
    session: MutexGuard<'c, Session>,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.conn.info().busy_with = None;
    }
}

impl Conn {
    /// Connect to a Vertica server.
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        let stream = Stream::connect(&opts)?;
        Self::with_stream(stream, opts)
    }

    /// Connect over an existing stream.
    ///
    /// Reconnects still open a TCP connection from `opts`.
    pub fn with_stream(stream: Stream, opts: Opts) -> Result<Self> {
        let conn = Self {
            opts,
            session: Mutex::new(Session {
                stream: None,
                buffer_set: BufferSet::new(),
                statement_counter: 0,
            }),
            info: Mutex::new(SessionInfo::default()),
        };
        {
            let mut busy = conn.acquire("connect".to_string())?;
            let booted = busy.boot(stream);
            busy.check(booted)?;
        }
        Ok(conn)
    }

    fn info(&self) -> MutexGuard<'_, SessionInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the gate or fail with [`Error::Synchronize`].
    fn acquire(&self, operation: String) -> Result<Busy<'_>> {
        let session = match self.session.try_lock() {
            Ok(session) => session,
            // The session is reset by the next fatal error, if it is broken
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                let busy_with = self
                    .info()
                    .busy_with
                    .clone()
                    .unwrap_or_else(|| "another operation".to_string());
                return Err(Error::Synchronize(busy_with));
            }
        };
        self.info().busy_with = Some(operation);
        Ok(Busy {
            conn: self,
            session,
        })
    }

    /// Run `f` holding the gate, on an open session.
    ///
    /// Only transport and protocol failures close the session. Errors the
    /// operation reports after draining to ReadyForQuery, including those of
    /// row callbacks, leave it open.
    fn run<T>(&self, operation: String, f: impl FnOnce(&mut Busy<'_>) -> Result<T>) -> Result<T> {
        let mut busy = self.acquire(operation)?;
        let opened = busy.ensure_open();
        busy.check(opened)?;
        f(&mut busy)
    }

    /// Run a simple query and buffer its rows.
    ///
    /// With several statements, the result of the last one is returned, or
    /// the first error.
    pub fn query(&self, sql: &str) -> Result<ResultSet> {
        self.query_with(sql, RowMode::Buffered)
    }

    /// Run a simple query, handing each row to `f`.
    pub fn query_each(&self, sql: &str, mut f: impl FnMut(Row) -> Result<()>) -> Result<ResultSet> {
        self.query_with(sql, RowMode::Streaming(&mut f))
    }

    pub fn query_with(&self, sql: &str, mode: RowMode<'_>) -> Result<ResultSet> {
        if is_blank_sql(sql) {
            return Err(Error::EmptyQuery);
        }
        self.run(format!("query {sql:?}"), |busy| {
            busy.simple_query(sql, mode, None)
        })
    }

    /// Run a `COPY ... FROM STDIN` statement, feeding it from `handler`.
    ///
    /// When `handler` fails, the copy is aborted with its error message and
    /// [`Error::CopyAborted`] is returned.
    pub fn copy<F>(&self, sql: &str, mut handler: F) -> Result<ResultSet>
    where
        F: FnMut(&mut CopyWriter<'_>) -> Result<()>,
    {
        if is_blank_sql(sql) {
            return Err(Error::EmptyQuery);
        }
        self.run(format!("copy {sql:?}"), |busy| {
            busy.simple_query(sql, RowMode::Buffered, Some(&mut handler as &mut CopyHandler<'_>))
        })
    }

    /// Run a `COPY ... FROM STDIN` statement, feeding it from `reader`.
    pub fn copy_from_reader(&self, sql: &str, mut reader: impl Read) -> Result<ResultSet> {
        self.copy(sql, |writer| {
            std::io::copy(&mut reader, writer)?;
            Ok(())
        })
    }

    /// Parse and describe `sql` on the server.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        if is_blank_sql(sql) {
            return Err(Error::EmptyQuery);
        }
        self.run(format!("prepare {sql:?}"), |busy| {
            busy.session.statement_counter += 1;
            let name = format!("s{}", busy.session.statement_counter);
            let conn = busy.conn;
            let mut state_machine = PrepareStateMachine::new(name, sql, &conn.opts.type_registry);
            busy.drive(&mut state_machine, None)?;
            state_machine.finish()
        })
    }

    /// Execute a prepared statement and buffer its rows.
    pub fn execute(&self, statement: &PreparedStatement, params: &[Value]) -> Result<ResultSet> {
        self.execute_with(statement, params, RowMode::Buffered)
    }

    /// Execute a prepared statement, handing each row to `f`.
    pub fn execute_each(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
        mut f: impl FnMut(Row) -> Result<()>,
    ) -> Result<ResultSet> {
        self.execute_with(statement, params, RowMode::Streaming(&mut f))
    }

    pub fn execute_with(
        &self,
        statement: &PreparedStatement,
        params: &[Value],
        mode: RowMode<'_>,
    ) -> Result<ResultSet> {
        let mut state_machine =
            ExecuteStateMachine::new(statement, params, &self.opts.type_registry, mode)?;
        self.run(format!("execute {}", statement.name()), |busy| {
            busy.drive(&mut state_machine, None).map(drop)
        })?;
        state_machine.finish()
    }

    /// Release a prepared statement on the server.
    pub fn close_statement(&self, statement: &PreparedStatement) -> Result<()> {
        self.run(format!("close {}", statement.name()), |busy| {
            let mut state_machine = CloseStatementStateMachine::new(statement.name());
            busy.drive(&mut state_machine, None)?;
            state_machine.finish()
        })
    }

    /// Ask the server to cancel the running operation.
    ///
    /// Sends CancelRequest over a second connection. The server does not
    /// answer, so success only means the request was sent.
    pub fn cancel(&self) -> Result<()> {
        let key = self
            .info()
            .backend_key
            .ok_or_else(|| Error::InvalidUsage("no backend key; the connection is closed".into()))?;
        let opts = self.opts.side_connection();
        let mut stream = Stream::connect(&opts)?;

        if opts.ssl_mode == SslMode::Require {
            stream.write_all(&SslRequest.to_bytes()?)?;
            stream.flush()?;
            stream = match stream.read_u8()? {
                b'S' => stream.upgrade_to_tls(&opts.host)?,
                b'N' => return Err(Error::SslNotSupported),
                other => {
                    return Err(Error::Connection(format!(
                        "Unexpected SSL response: {other:#04x}"
                    )));
                }
            };
        }

        let mut request = CancelRequest {
            pid: key.process_id(),
            secret_key: key.secret(),
        }
        .to_bytes()?;
        Flush.encode(&mut request)?;
        stream.write_all(&request)?;
        stream.flush()?;
        if let Err(e) = stream.shutdown() {
            tracing::debug!(error = %e, "cancel connection shutdown failed");
        }
        tracing::debug!(pid = key.process_id(), "cancel request sent");
        Ok(())
    }

    /// Close this session from a second connection.
    ///
    /// Needs the session id fetched at connect time, so `interruptable` must
    /// have been set.
    pub fn interrupt(&self) -> Result<Value> {
        let session_id = self
            .info()
            .session_id
            .clone()
            .ok_or(Error::InterruptImpossible)?;
        let side = Conn::new(self.opts.side_connection())?;
        let result = side.query(&format!("SELECT CLOSE_SESSION({})", quote_literal(&session_id)));
        if let Err(e) = side.close() {
            tracing::debug!(error = %e, "interrupt connection close failed");
        }
        tracing::debug!(%session_id, "interrupt sent");
        Ok(result?.value()?.clone())
    }

    /// Send Terminate and close the stream.
    ///
    /// Transport errors are ignored; the session is always cleared.
    pub fn close(&self) -> Result<()> {
        let mut busy = self.acquire("close".to_string())?;
        busy.terminate();
        Ok(())
    }

    /// Close and connect again.
    ///
    /// Pending notices and notifications are dropped.
    pub fn reset(&self) -> Result<()> {
        let mut busy = self.acquire("reset".to_string())?;
        busy.terminate();
        {
            let mut info = self.info();
            info.notices.clear();
            info.notifications.clear();
        }
        let booted = Stream::connect(&self.opts).and_then(|stream| busy.boot(stream));
        busy.check(booted)
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn is_open(&self) -> bool {
        self.info().open
    }

    pub fn is_busy(&self) -> bool {
        self.info().busy_with.is_some()
    }

    /// Description of the operation in flight.
    pub fn busy_with(&self) -> Option<String> {
        self.info().busy_with.clone()
    }

    /// Transaction status from the last ReadyForQuery.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.info().transaction_status
    }

    /// Server parameters reported by ParameterStatus.
    pub fn parameters(&self) -> HashMap<String, String> {
        self.info().parameters.clone()
    }

    pub fn parameter(&self, name: &str) -> Option<String> {
        self.info().parameters.get(name).cloned()
    }

    /// Process id and secret key for cancellation.
    pub fn backend_key(&self) -> Option<BackendKeyData> {
        self.info().backend_key
    }

    pub fn session_id(&self) -> Option<String> {
        self.info().session_id.clone()
    }

    pub fn is_interruptable(&self) -> bool {
        self.opts.interruptable
    }

    pub fn is_ssl(&self) -> bool {
        self.info().ssl
    }

    /// Notices received so far.
    pub fn take_notices(&self) -> Vec<ErrorFields> {
        self.info().notices.drain(..).collect()
    }

    /// Notifications received so far.
    pub fn take_notifications(&self) -> Vec<Notification> {
        self.info().notifications.drain(..).collect()
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        let session = self
            .session
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(mut stream) = session.stream.take() {
            send_terminate(&mut stream);
        }
    }
}

fn send_terminate(stream: &mut Stream) {
    let sent = Terminate
        .to_bytes()
        .and_then(|bytes| stream.write_all(&bytes))
        .and_then(|()| stream.flush());
    if let Err(e) = sent {
        tracing::debug!(error = %e, "terminate failed");
    }
    if let Err(e) = stream.shutdown() {
        tracing::debug!(error = %e, "shutdown failed");
    }
}

impl Busy<'_> {
    /// Close the stream if `result` is a connection-fatal error.
    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_connection_fatal()
        {
            tracing::debug!(error = %e, "closing connection");
            if let Some(mut stream) = self.session.stream.take()
                && let Err(e) = stream.shutdown()
            {
                tracing::debug!(error = %e, "shutdown failed");
            }
            self.conn.info().clear_session();
        }
        result
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.session.stream.is_some() {
            return Ok(());
        }
        if !self.conn.opts.auto_reconnect {
            return Err(Error::Connection("the connection is closed".into()));
        }
        tracing::debug!("reconnecting");
        let stream = Stream::connect(&self.conn.opts)?;
        self.boot(stream)
    }

    fn terminate(&mut self) {
        if let Some(mut stream) = self.session.stream.take() {
            send_terminate(&mut stream);
        }
        self.conn.info().clear_session();
        tracing::debug!("connection closed");
    }

    /// Handshake, then session setup.
    ///
    /// A session whose setup failed is closed, never left half configured.
    fn boot(&mut self, stream: Stream) -> Result<()> {
        self.handshake(stream)?;
        let setup = self.setup_session();
        if let Err(e) = &setup {
            tracing::debug!(error = %e, "session setup failed");
            self.terminate();
        }
        setup
    }

    /// Session initialization queries and the session id lookup.
    fn setup_session(&mut self) -> Result<()> {
        let conn = self.conn;
        for sql in conn.opts.session_init_queries() {
            self.simple_query(&sql, RowMode::Buffered, None)?;
        }
        if conn.opts.interruptable {
            let result = self.simple_query(SESSION_ID_QUERY, RowMode::Buffered, None)?;
            let session_id = match result.value()? {
                Value::Text(id) => id.clone(),
                Value::Integer(id) => id.to_string(),
                other => {
                    return Err(Error::Decode(format!("unexpected session id {other:?}")));
                }
            };
            conn.info().session_id = Some(session_id);
        }
        tracing::debug!(host = %conn.opts.host, port = conn.opts.port, "session ready");
        Ok(())
    }

    fn handshake(&mut self, mut stream: Stream) -> Result<()> {
        let conn = self.conn;
        let buffer_set = &mut self.session.buffer_set;
        conn.info().clear_session();

        let mut state_machine = ConnectionStateMachine::new(&conn.opts);
        let mut action = state_machine.step(buffer_set)?;
        loop {
            action = match action {
                Action::WriteAndReadByte => {
                    stream.write_all(&buffer_set.write_buffer)?;
                    stream.flush()?;
                    state_machine.set_ssl_response(stream.read_u8()?);
                    state_machine.step(buffer_set)?
                }
                Action::TlsHandshake => {
                    stream = stream.upgrade_to_tls(&conn.opts.host)?;
                    state_machine.step(buffer_set)?
                }
                Action::ReadMessage => {
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::WriteAndReadMessage => {
                    stream.write_all(&buffer_set.write_buffer)?;
                    stream.flush()?;
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::HandleAsyncMessageAndReadMessage(message) => {
                    conn.info().apply(message);
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::CopyIn => {
                    return Err(Error::Connection("CopyInResponse during startup".into()));
                }
                Action::Finished => break,
            };
        }

        {
            let mut info = conn.info();
            info.open = true;
            info.ssl = stream.is_tls();
            info.transaction_status = state_machine.transaction_status();
        }
        self.session.stream = Some(stream);
        Ok(())
    }

    /// Run a simple query cycle, with an optional COPY source.
    fn simple_query(
        &mut self,
        sql: &str,
        mode: RowMode<'_>,
        copy: Option<&mut CopyHandler<'_>>,
    ) -> Result<ResultSet> {
        let conn = self.conn;
        let mut state_machine = SimpleQueryStateMachine::new(sql, &conn.opts.type_registry, mode);
        let copy_failure = self.drive(&mut state_machine, copy)?;
        let result = state_machine.finish();
        match copy_failure {
            None => result,
            Some(message) => Err(Error::CopyAborted {
                message,
                server: match result {
                    Err(Error::Query(server)) => Some(server),
                    _ => None,
                },
            }),
        }
    }

    /// Drive a state machine to ReadyForQuery, closing the session on a
    /// connection-fatal error.
    ///
    /// Returns the message sent with CopyFail, if a COPY was aborted.
    fn drive<S: StateMachine>(
        &mut self,
        state_machine: &mut S,
        copy: Option<&mut CopyHandler<'_>>,
    ) -> Result<Option<String>> {
        let result = self.pump(state_machine, copy);
        self.check(result)
    }

    fn pump<S: StateMachine>(
        &mut self,
        state_machine: &mut S,
        mut copy: Option<&mut CopyHandler<'_>>,
    ) -> Result<Option<String>> {
        let conn = self.conn;
        let Session {
            stream, buffer_set, ..
        } = &mut *self.session;
        let stream = stream
            .as_mut()
            .ok_or_else(|| Error::Connection("the connection is closed".into()))?;

        let mut copy_failure = None;
        let mut action = state_machine.step(buffer_set)?;
        loop {
            action = match action {
                Action::WriteAndReadByte | Action::TlsHandshake => {
                    return Err(Error::Message(format!(
                        "Unexpected {action:?} outside the handshake"
                    )));
                }
                Action::ReadMessage => {
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::WriteAndReadMessage => {
                    stream.write_all(&buffer_set.write_buffer)?;
                    stream.flush()?;
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::HandleAsyncMessageAndReadMessage(message) => {
                    conn.info().apply(message);
                    stream.read_message(buffer_set)?;
                    state_machine.step(buffer_set)?
                }
                Action::CopyIn => match copy.as_deref_mut() {
                    None => {
                        copy_failure = Some(NO_COPY_HANDLER.to_string());
                        state_machine.copy_fail(buffer_set, NO_COPY_HANDLER)?
                    }
                    Some(handler) => {
                        let mut writer = CopyWriter::new(stream);
                        let outcome = handler(&mut writer);
                        tracing::debug!(bytes = writer.bytes_sent(), "copy data sent");
                        if let Some(e) = writer.take_stream_error() {
                            return Err(e);
                        }
                        match outcome {
                            Ok(()) => state_machine.copy_done(buffer_set)?,
                            Err(e) => {
                                let message = e.to_string();
                                let next = state_machine.copy_fail(buffer_set, &message)?;
                                copy_failure = Some(message);
                                next
                            }
                        }
                    }
                },
                Action::Finished => {
                    conn.info().transaction_status = state_machine.transaction_status();
                    return Ok(copy_failure);
                }
            };
        }
    }
}
