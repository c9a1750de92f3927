//! Simple query protocol state machine.

use std::sync::Arc;

use crate::buffer_set::BufferSet;
use crate::error::{Error, QueryError, Result};
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::{CopyDone, CopyFail, Query};
use crate::protocol::types::TransactionStatus;
use crate::result::{ResultBuilder, ResultSet, RowMode};
use crate::row::RowDescription;
use crate::types::TypeRegistry;

use super::action::{Action, AsyncMessage};
use super::{FirstError, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingResponse,
    CopyIn,
    Finished,
}

/// Simple query protocol state machine.
///
/// Sends one Query message, which may hold several statements, and reads
/// until ReadyForQuery. The first error is kept and returned by `finish`
/// once the server is ready again.
pub struct SimpleQueryStateMachine<'a, 'h> {
    state: State,
    sql: &'a str,
    registry: &'a TypeRegistry,
    builder: ResultBuilder<'h>,
    error: FirstError,
    transaction_status: Option<TransactionStatus>,
}

impl<'a, 'h> SimpleQueryStateMachine<'a, 'h> {
    pub fn new(sql: &'a str, registry: &'a TypeRegistry, mode: RowMode<'h>) -> Self {
        Self {
            state: State::Initial,
            sql,
            registry,
            builder: ResultBuilder::new(mode),
            error: FirstError::default(),
            transaction_status: None,
        }
    }

    /// The result of the last statement, or the first error of the cycle.
    pub fn finish(self) -> Result<ResultSet> {
        self.error.into_result(self.builder.finish())
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match buffer_set.message()? {
            BackendMessage::RowDescription(message) => {
                let started = RowDescription::from_message(&message, self.registry)
                    .and_then(|description| self.builder.start(Arc::new(description)));
                if let Err(e) = started {
                    self.error.set(e);
                }
            }
            BackendMessage::DataRow(row) => {
                // Delivery stops at the first error
                if !self.error.is_set()
                    && let Err(e) = self.builder.add_row(&row)
                {
                    self.error.set(e);
                }
            }
            BackendMessage::CommandComplete(complete) => self.builder.complete(Some(complete.tag)),
            BackendMessage::EmptyQueryResponse => self.error.set(Error::EmptyQuery),
            BackendMessage::ErrorResponse(error) => {
                self.error.set(QueryError::new(error.fields, self.sql).into());
            }
            BackendMessage::CopyInResponse(_) => {
                self.state = State::CopyIn;
                return Ok(Action::CopyIn);
            }
            BackendMessage::ReadyForQuery(ready) => {
                self.transaction_status = Some(ready.transaction_status);
                self.state = State::Finished;
                return Ok(Action::Finished);
            }
            other => {
                return match AsyncMessage::from_message(&other) {
                    Some(message) => Ok(Action::HandleAsyncMessageAndReadMessage(message)),
                    None => Err(Error::Message(format!(
                        "Unexpected {} in query response",
                        other.name()
                    ))),
                };
            }
        }
        Ok(Action::ReadMessage)
    }

    fn expect_copy_in(&self) -> Result<()> {
        if self.state == State::CopyIn {
            Ok(())
        } else {
            Err(Error::Message(format!(
                "No COPY in progress (state {:?})",
                self.state
            )))
        }
    }
}

impl StateMachine for SimpleQueryStateMachine<'_, '_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            State::Initial => {
                buffer_set.write_only(&Query(self.sql))?;
                self.state = State::WaitingResponse;
                Ok(Action::WriteAndReadMessage)
            }
            State::WaitingResponse => self.handle_message(buffer_set),
            State::CopyIn => Err(Error::Message(
                "COPY must end with CopyDone or CopyFail".into(),
            )),
            State::Finished => Err(Error::Message("Query already finished".into())),
        }
    }

    fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }

    fn copy_done(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        self.expect_copy_in()?;
        buffer_set.write_only(&CopyDone)?;
        self.state = State::WaitingResponse;
        Ok(Action::WriteAndReadMessage)
    }

    fn copy_fail(&mut self, buffer_set: &mut BufferSet, message: &str) -> Result<Action> {
        self.expect_copy_in()?;
        let message = message.replace('\0', " ");
        buffer_set.write_only(&CopyFail(&message))?;
        self.state = State::WaitingResponse;
        Ok(Action::WriteAndReadMessage)
    }
}
