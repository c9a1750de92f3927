//! Extended query protocol state machines: prepare, execute and close.

use std::sync::Arc;

use crate::buffer_set::BufferSet;
use crate::error::{Error, QueryError, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::{Bind, Close, Describe, Execute, Flush, Parse, Sync, Target};
use crate::protocol::types::{Oid, TransactionStatus};
use crate::result::{ResultBuilder, ResultSet, RowMode};
use crate::row::RowDescription;
use crate::types::{TypeRegistry, Value, encode_param};

use super::action::{Action, AsyncMessage};
use super::{FirstError, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    Finished,
}

/// A statement parsed on the server, ready to be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    name: String,
    sql: String,
    param_types: Vec<Oid>,
    description: Option<Arc<RowDescription>>,
}

impl PreparedStatement {
    /// Server-side statement name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter type OIDs as described by the server.
    pub fn param_types(&self) -> &[Oid] {
        &self.param_types
    }

    /// Shape of the rows the statement returns.
    pub fn description(&self) -> Option<&Arc<RowDescription>> {
        self.description.as_ref()
    }
}

/// Turn a session-level message into an action, or fail on anything else.
fn session_message(message: &BackendMessage<'_>, context: &str) -> Result<Action> {
    match AsyncMessage::from_message(message) {
        Some(message) => Ok(Action::HandleAsyncMessageAndReadMessage(message)),
        None => Err(Error::Message(format!(
            "Unexpected {} in {context}",
            message.name()
        ))),
    }
}

/// Parse and describe a statement without executing it.
///
/// Sends Parse, Describe(statement), Sync and Flush.
pub struct PrepareStateMachine<'a> {
    state: State,
    name: String,
    sql: &'a str,
    registry: &'a TypeRegistry,
    param_types: Vec<Oid>,
    description: Option<Arc<RowDescription>>,
    error: FirstError,
    transaction_status: Option<TransactionStatus>,
}

impl<'a> PrepareStateMachine<'a> {
    pub fn new(name: String, sql: &'a str, registry: &'a TypeRegistry) -> Self {
        Self {
            state: State::Initial,
            name,
            sql,
            registry,
            param_types: Vec::new(),
            description: None,
            error: FirstError::default(),
            transaction_status: None,
        }
    }

    pub fn finish(self) -> Result<PreparedStatement> {
        self.error.into_result(PreparedStatement {
            name: self.name,
            sql: self.sql.to_string(),
            param_types: self.param_types,
            description: self.description,
        })
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match buffer_set.message()? {
            BackendMessage::ParseComplete => {}
            BackendMessage::ParameterDescription(params) => self.param_types = params.param_types,
            BackendMessage::RowDescription(message) => {
                match RowDescription::from_message(&message, self.registry) {
                    Ok(description) => self.description = Some(Arc::new(description)),
                    Err(e) => self.error.set(e),
                }
            }
            // Describe found nothing to run
            BackendMessage::NoData => self.error.set(Error::EmptyQuery),
            BackendMessage::ErrorResponse(error) => {
                self.error.set(QueryError::new(error.fields, self.sql).into());
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.transaction_status = Some(ready.transaction_status);
                self.state = State::Finished;
                return Ok(Action::Finished);
            }
            other => return session_message(&other, "prepare response"),
        }
        Ok(Action::ReadMessage)
    }
}

impl StateMachine for PrepareStateMachine<'_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_only(&Parse {
                    name: &self.name,
                    sql: self.sql,
                    param_types: &[],
                })?;
                buffer_set.write(&Describe {
                    target: Target::Statement,
                    name: &self.name,
                })?;
                buffer_set.write(&Sync)?;
                buffer_set.write(&Flush)?;
                self.state = State::WaitingResponse;
                Ok(Action::WriteAndReadMessage)
            }
            State::WaitingResponse => self.handle_message(buffer_set),
            State::Finished => Err(Error::Message("Prepare already finished".into())),
        }
    }

    fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }
}

/// Bind parameters to a prepared statement and run it.
///
/// Sends Bind and Execute on the unnamed portal, then Sync and Flush.
pub struct ExecuteStateMachine<'a, 'h> {
    state: State,
    statement: &'a PreparedStatement,
    values: Vec<Option<Vec<u8>>>,
    builder: ResultBuilder<'h>,
    error: FirstError,
    transaction_status: Option<TransactionStatus>,
}

impl<'a, 'h> ExecuteStateMachine<'a, 'h> {
    /// Fails with [`Error::InvalidUsage`] when the parameter count is wrong.
    pub fn new(
        statement: &'a PreparedStatement,
        params: &[Value],
        registry: &TypeRegistry,
        mode: RowMode<'h>,
    ) -> Result<Self> {
        if params.len() != statement.param_types.len() {
            return Err(Error::InvalidUsage(format!(
                "statement {} expects {} parameters, got {}",
                statement.name,
                statement.param_types.len(),
                params.len()
            )));
        }
        let values = params
            .iter()
            .zip(&statement.param_types)
            .map(|(value, oid)| encode_param(value, registry.get(*oid)))
            .collect();

        let mut builder = ResultBuilder::new(mode);
        if let Some(description) = &statement.description {
            builder.start(Arc::clone(description))?;
        }

        Ok(Self {
            state: State::Initial,
            statement,
            values,
            builder,
            error: FirstError::default(),
            transaction_status: None,
        })
    }

    /// The rows of the execution, or its first error.
    pub fn finish(self) -> Result<ResultSet> {
        self.error.into_result(self.builder.finish())
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match buffer_set.message()? {
            BackendMessage::BindComplete => {}
            BackendMessage::DataRow(row) => {
                if !self.error.is_set()
                    && let Err(e) = self.builder.add_row(&row)
                {
                    self.error.set(e);
                }
            }
            BackendMessage::CommandComplete(complete) => self.builder.complete(Some(complete.tag)),
            BackendMessage::PortalSuspended => self.builder.complete(None),
            BackendMessage::EmptyQueryResponse => self.error.set(Error::EmptyQuery),
            BackendMessage::ErrorResponse(error) => {
                self.error
                    .set(QueryError::new(error.fields, self.statement.sql.as_str()).into());
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.transaction_status = Some(ready.transaction_status);
                self.state = State::Finished;
                return Ok(Action::Finished);
            }
            other => return session_message(&other, "execute response"),
        }
        Ok(Action::ReadMessage)
    }
}

impl StateMachine for ExecuteStateMachine<'_, '_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_only(&Bind {
                    portal: "",
                    statement: &self.statement.name,
                    param_types: &self.statement.param_types,
                    values: &self.values,
                })?;
                buffer_set.write(&Execute {
                    portal: "",
                    max_rows: 0,
                })?;
                buffer_set.write(&Sync)?;
                buffer_set.write(&Flush)?;
                self.state = State::WaitingResponse;
                Ok(Action::WriteAndReadMessage)
            }
            State::WaitingResponse => self.handle_message(buffer_set),
            State::Finished => Err(Error::Message("Execute already finished".into())),
        }
    }

    fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }
}

/// Release a prepared statement on the server.
pub struct CloseStatementStateMachine<'a> {
    state: State,
    name: &'a str,
    error: FirstError,
    transaction_status: Option<TransactionStatus>,
}

impl<'a> CloseStatementStateMachine<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            state: State::Initial,
            name,
            error: FirstError::default(),
            transaction_status: None,
        }
    }

    pub fn finish(self) -> Result<()> {
        self.error.into_result(())
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match buffer_set.message()? {
            BackendMessage::CloseComplete => {}
            BackendMessage::ErrorResponse(error) => {
                let sql = format!("CLOSE {}", self.name);
                self.error.set(QueryError::new(error.fields, sql).into());
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.transaction_status = Some(ready.transaction_status);
                self.state = State::Finished;
                return Ok(Action::Finished);
            }
            other => return session_message(&other, "close response"),
        }
        Ok(Action::ReadMessage)
    }
}

impl StateMachine for CloseStatementStateMachine<'_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_only(&Close {
                    target: Target::Statement,
                    name: self.name,
                })?;
                buffer_set.write(&Sync)?;
                self.state = State::WaitingResponse;
                Ok(Action::WriteAndReadMessage)
            }
            State::WaitingResponse => self.handle_message(buffer_set),
            State::Finished => Err(Error::Message("Close already finished".into())),
        }
    }

    fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTEGER_COLUMN: &[u8] = b"\x00\x01n\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x06\x00\x08\xff\xff\xff\xff\x00\x00";

    fn feed(sm: &mut impl StateMachine, tag: u8, payload: &[u8]) -> Result<Action> {
        let mut buffer_set = BufferSet::new();
        buffer_set.type_byte = tag;
        buffer_set.read_buffer.extend_from_slice(payload);
        sm.step(&mut buffer_set)
    }

    fn prepare(registry: &TypeRegistry) -> PreparedStatement {
        let mut sm = PrepareStateMachine::new("s1".into(), "SELECT n FROM t WHERE n > ?", registry);
        let mut buffer_set = BufferSet::new();
        sm.step(&mut buffer_set).unwrap();

        let tags: Vec<u8> = frame_tags(&buffer_set.write_buffer);
        assert_eq!(tags, b"PDSH");

        feed(&mut sm, b'1', b"").unwrap();
        feed(&mut sm, b't', b"\x00\x01\x00\x00\x00\x06").unwrap();
        feed(&mut sm, b'T', INTEGER_COLUMN).unwrap();
        assert!(matches!(feed(&mut sm, b'Z', b"I").unwrap(), Action::Finished));
        sm.finish().unwrap()
    }

    fn frame_tags(mut bytes: &[u8]) -> Vec<u8> {
        let mut tags = Vec::new();
        while let [tag, a, b, c, d, ..] = *bytes {
            tags.push(tag);
            let len = u32::from_be_bytes([a, b, c, d]) as usize;
            bytes = &bytes[1 + len..];
        }
        tags
    }

    #[test]
    fn test_prepare() {
        let registry = TypeRegistry::standard();
        let statement = prepare(&registry);
        assert_eq!(statement.name(), "s1");
        assert_eq!(statement.param_types(), &[6]);
        let description = statement.description().unwrap();
        assert_eq!(description.columns()[0].name(), "n");
    }

    #[test]
    fn test_prepare_no_data_is_empty_query() {
        let registry = TypeRegistry::standard();
        let mut sm = PrepareStateMachine::new("s2".into(), "-- nothing", &registry);
        sm.step(&mut BufferSet::new()).unwrap();
        feed(&mut sm, b'1', b"").unwrap();
        feed(&mut sm, b't', b"\x00\x00").unwrap();
        feed(&mut sm, b'n', b"").unwrap();
        feed(&mut sm, b'Z', b"I").unwrap();
        assert!(matches!(sm.finish(), Err(Error::EmptyQuery)));
    }

    #[test]
    fn test_execute() {
        let registry = TypeRegistry::standard();
        let statement = prepare(&registry);
        let params = [Value::Integer(1)];
        let mut sm =
            ExecuteStateMachine::new(&statement, &params, &registry, RowMode::Buffered).unwrap();
        let mut buffer_set = BufferSet::new();
        sm.step(&mut buffer_set).unwrap();
        assert_eq!(frame_tags(&buffer_set.write_buffer), b"BESH");

        feed(&mut sm, b'2', b"").unwrap();
        feed(&mut sm, b'D', b"\x00\x01\x00\x00\x00\x017").unwrap();
        feed(&mut sm, b'C', b"SELECT 1\0").unwrap();
        feed(&mut sm, b'Z', b"T").unwrap();
        assert_eq!(sm.transaction_status(), Some(TransactionStatus::InTransaction));

        let result = sm.finish().unwrap();
        assert_eq!(result.value().unwrap(), &Value::Integer(7));
    }

    #[test]
    fn test_execute_portal_suspended() {
        let registry = TypeRegistry::standard();
        let statement = prepare(&registry);
        let params = [Value::Integer(1)];
        let mut sm =
            ExecuteStateMachine::new(&statement, &params, &registry, RowMode::Buffered).unwrap();
        sm.step(&mut BufferSet::new()).unwrap();

        feed(&mut sm, b'2', b"").unwrap();
        feed(&mut sm, b'D', b"\x00\x01\x00\x00\x00\x017").unwrap();
        feed(&mut sm, b's', b"").unwrap();
        feed(&mut sm, b'Z', b"I").unwrap();

        let result = sm.finish().unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.tag(), None);
    }

    #[test]
    fn test_execute_param_count() {
        let registry = TypeRegistry::standard();
        let statement = prepare(&registry);
        let result = ExecuteStateMachine::new(&statement, &[], &registry, RowMode::Buffered);
        assert!(matches!(result, Err(Error::InvalidUsage(_))));
    }

    #[test]
    fn test_execute_error_keeps_sql() {
        let registry = TypeRegistry::standard();
        let statement = prepare(&registry);
        let params = [Value::Text("x".into())];
        let mut sm =
            ExecuteStateMachine::new(&statement, &params, &registry, RowMode::Buffered).unwrap();
        sm.step(&mut BufferSet::new()).unwrap();

        feed(&mut sm, b'E', b"SERROR\0C22V02\0MInvalid input syntax\0\0").unwrap();
        feed(&mut sm, b'Z', b"I").unwrap();

        let err = sm.finish().unwrap_err();
        assert_eq!(err.query_error().unwrap().sql, "SELECT n FROM t WHERE n > ?");
    }

    #[test]
    fn test_close_statement() {
        let mut sm = CloseStatementStateMachine::new("s1");
        let mut buffer_set = BufferSet::new();
        sm.step(&mut buffer_set).unwrap();
        assert_eq!(buffer_set.write_buffer, b"C\x00\x00\x00\x08Ss1\x00S\x00\x00\x00\x04");

        feed(&mut sm, b'3', b"").unwrap();
        feed(&mut sm, b'Z', b"I").unwrap();
        sm.finish().unwrap();
    }
}
