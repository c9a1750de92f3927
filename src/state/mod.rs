//! Sans-I/O state machines for the Vertica protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! They produce `Action` values that tell the caller what to do next.

pub mod action;
pub mod connection;
pub mod extended;
pub mod simple_query;

pub use action::{Action, AsyncMessage, Notification};
pub use connection::{ConnectionState, ConnectionStateMachine};
pub use extended::{
    CloseStatementStateMachine, ExecuteStateMachine, PrepareStateMachine, PreparedStatement,
};
pub use simple_query::SimpleQueryStateMachine;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::protocol::types::TransactionStatus;

/// A request cycle that runs until ReadyForQuery.
pub trait StateMachine {
    /// Advance using the message in `buffer_set` (or start, on the first call).
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;

    /// Transaction status from the final ReadyForQuery.
    fn transaction_status(&self) -> Option<TransactionStatus>;

    /// The copy source finished; send CopyDone.
    fn copy_done(&mut self, _buffer_set: &mut BufferSet) -> Result<Action> {
        Err(Error::Message("CopyInResponse outside a simple query".into()))
    }

    /// The copy source failed or is missing; send CopyFail.
    fn copy_fail(&mut self, _buffer_set: &mut BufferSet, _message: &str) -> Result<Action> {
        Err(Error::Message("CopyInResponse outside a simple query".into()))
    }
}

/// Keeps the first error of a request cycle.
///
/// Later errors are dropped; the cycle still runs to ReadyForQuery.
#[derive(Debug, Default)]
pub(crate) struct FirstError(Option<Error>);

impl FirstError {
    pub(crate) fn set(&mut self, error: Error) {
        if self.0.is_none() {
            self.0 = Some(error);
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.is_some()
    }

    pub(crate) fn into_result<T>(self, value: T) -> Result<T> {
        match self.0 {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }
}

/// True when `sql` holds nothing but whitespace and comments.
pub fn is_blank_sql(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if rest.is_empty() {
            return true;
        }
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.find('\n').map_or("", |end| &comment[end + 1..]);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            match comment.find("*/") {
                Some(end) => rest = &comment[end + 2..],
                // Left for the server to reject
                None => return false,
            }
        } else {
            return false;
        }
        rest = rest.trim_start();
    }
}
