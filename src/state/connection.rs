//! Connection startup and authentication state machine.

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::{Opts, SslMode};
use crate::protocol::backend::{Authentication, BackendMessage};
use crate::protocol::frontend::{ClientInfo, Password, SslRequest, Startup};
use crate::protocol::types::TransactionStatus;

use super::StateMachine;
use super::action::{Action, AsyncMessage};

/// Connection state during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Initial,
    WaitingSslResponse,
    SslHandshake,
    WaitingAuth,
    WaitingReady,
    Ready,
}

/// Connection startup state machine.
///
/// Drives SSL negotiation, the startup message and authentication up to the
/// first ReadyForQuery. Session-level messages are passed to the caller as
/// [`AsyncMessage`]s.
pub struct ConnectionStateMachine<'a> {
    state: ConnectionState,
    opts: &'a Opts,
    client: Option<ClientInfo>,
    ssl_response: Option<u8>,
    transaction_status: Option<TransactionStatus>,
}

impl<'a> ConnectionStateMachine<'a> {
    pub fn new(opts: &'a Opts) -> Self {
        Self {
            state: ConnectionState::Initial,
            opts,
            client: opts.send_client_info.then(ClientInfo::current),
            ssl_response: None,
            transaction_status: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Record the single-byte answer to SSLRequest.
    pub fn set_ssl_response(&mut self, response: u8) {
        self.ssl_response = Some(response);
    }

    fn write_startup(&self, buffer_set: &mut BufferSet) -> Result<()> {
        let startup = Startup {
            user: Some(self.opts.user.as_str()).filter(|user| !user.is_empty()),
            database: self.opts.database.as_deref(),
            client: self.client.as_ref(),
            options: self.opts.options.as_deref(),
        };
        buffer_set.write_only(&startup)
    }

    fn handle_message(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        let response = match buffer_set.message()? {
            BackendMessage::Authentication(Authentication::Ok)
                if self.state == ConnectionState::WaitingAuth =>
            {
                self.state = ConnectionState::WaitingReady;
                return Ok(Action::ReadMessage);
            }
            BackendMessage::Authentication(auth) if self.state == ConnectionState::WaitingAuth => {
                self.password_response(&auth)?
            }
            BackendMessage::ErrorResponse(error) => return Err(error.into_connection_error()),
            BackendMessage::ReadyForQuery(ready) if self.state == ConnectionState::WaitingReady => {
                self.transaction_status = Some(ready.transaction_status);
                self.state = ConnectionState::Ready;
                return Ok(Action::Finished);
            }
            BackendMessage::Unknown { tag, .. } => {
                return Err(Error::Connection(format!(
                    "Unknown message during startup: {:?}",
                    char::from(tag)
                )));
            }
            other => {
                return match AsyncMessage::from_message(&other) {
                    Some(message) => Ok(Action::HandleAsyncMessageAndReadMessage(message)),
                    None => Err(Error::Connection(format!(
                        "Unexpected {} in state {:?}",
                        other.name(),
                        self.state
                    ))),
                };
            }
        };

        buffer_set.write_only(&Password(&response))?;
        Ok(Action::WriteAndReadMessage)
    }

    fn password_response(&self, auth: &Authentication<'_>) -> Result<String> {
        let challenge = auth.password_challenge().ok_or_else(|| {
            Error::Unsupported(format!("Unsupported authentication method: {auth:?}"))
        })?;
        let password = self.opts.password.as_deref().unwrap_or_default();
        self.opts
            .password_hasher
            .password_response(&challenge, &self.opts.user, password)
    }
}

impl StateMachine for ConnectionStateMachine<'_> {
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        match self.state {
            ConnectionState::Initial => match self.opts.ssl_mode {
                SslMode::Require => {
                    buffer_set.write_only(&SslRequest)?;
                    self.state = ConnectionState::WaitingSslResponse;
                    Ok(Action::WriteAndReadByte)
                }
                SslMode::Disable => {
                    self.write_startup(buffer_set)?;
                    self.state = ConnectionState::WaitingAuth;
                    Ok(Action::WriteAndReadMessage)
                }
            },
            ConnectionState::WaitingSslResponse => match self.ssl_response.take() {
                Some(b'S') => {
                    self.state = ConnectionState::SslHandshake;
                    Ok(Action::TlsHandshake)
                }
                Some(b'N') => Err(Error::SslNotSupported),
                Some(other) => Err(Error::Connection(format!(
                    "Unexpected SSL response: {other:#04x}"
                ))),
                None => Err(Error::Connection("SSL response was not read".into())),
            },
            ConnectionState::SslHandshake => {
                self.write_startup(buffer_set)?;
                self.state = ConnectionState::WaitingAuth;
                Ok(Action::WriteAndReadMessage)
            }
            ConnectionState::WaitingAuth | ConnectionState::WaitingReady => {
                self.handle_message(buffer_set)
            }
            ConnectionState::Ready => Err(Error::Connection("Handshake already finished".into())),
        }
    }

    fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }
}
