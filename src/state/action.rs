//! Action types for state machine I/O requests.

use crate::error::{ErrorFields, Result};
use crate::protocol::backend::{BackendKeyData, BackendMessage};
use crate::protocol::frontend::{CopyData, FrontendMessage};

/// Action requested by a state machine.
///
/// The caller performs the requested I/O and then calls `step()` again.
#[derive(Debug)]
pub enum Action {
    /// Write `buffer_set.write_buffer`, then read a single byte.
    ///
    /// Used for SSL negotiation: the server answers `S` or `N`.
    WriteAndReadByte,

    /// Read one backend message into the buffer set.
    ReadMessage,

    /// Write `buffer_set.write_buffer`, then read a message.
    WriteAndReadMessage,

    /// Perform the TLS handshake, then call `step()` again.
    TlsHandshake,

    /// The server is ready for COPY data.
    ///
    /// The caller streams [`CopyData`] frames from its copy source, then
    /// reports the outcome with `copy_done()` or `copy_fail()`.
    CopyIn,

    /// A session-level message arrived.
    ///
    /// The caller applies it to the session, reads the next message, then
    /// calls `step()` again.
    HandleAsyncMessageAndReadMessage(AsyncMessage),

    /// The request cycle is over.
    Finished,
}

/// Notification from another session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// PID of the notifying backend process
    pub pid: u32,
    pub condition: String,
    pub payload: String,
}

/// A message that updates the session rather than the current operation.
///
/// These can arrive at any time during a request cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncMessage {
    Notification(Notification),

    /// Non-fatal notice from the server
    Notice(ErrorFields),

    /// Server parameter value changed
    ParameterChanged { name: String, value: String },

    /// Process id and secret key used to cancel this session
    BackendKey(BackendKeyData),

    /// A message this client does not know, already consumed from the stream
    Unknown { tag: u8, len: usize },
}

impl AsyncMessage {
    /// Extract the session-level part of `message`, if it is one.
    pub fn from_message(message: &BackendMessage<'_>) -> Option<Self> {
        let async_message = match message {
            BackendMessage::ParameterStatus(param) => AsyncMessage::ParameterChanged {
                name: param.name.to_string(),
                value: param.value.to_string(),
            },
            BackendMessage::NoticeResponse(notice) => AsyncMessage::Notice(notice.fields.clone()),
            BackendMessage::NotificationResponse(notification) => {
                AsyncMessage::Notification(Notification {
                    pid: notification.pid,
                    condition: notification.condition.to_string(),
                    payload: notification.payload.to_string(),
                })
            }
            BackendMessage::BackendKeyData(key) => AsyncMessage::BackendKey(*key),
            BackendMessage::Unknown { tag, payload } => AsyncMessage::Unknown {
                tag: *tag,
                len: payload.len(),
            },
            _ => return None,
        };
        Some(async_message)
    }
}

/// Cap on the payload of one CopyData frame.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Append `data` to `out` as CopyData frames of at most [`COPY_CHUNK_SIZE`] bytes.
pub fn write_copy_data(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    for chunk in data.chunks(COPY_CHUNK_SIZE) {
        CopyData(chunk).encode(out)?;
    }
    Ok(())
}
