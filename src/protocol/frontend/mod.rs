//! Frontend (client → server) messages.
//!
//! Every message is a plain struct implementing the sealed
//! [`FrontendMessage`] trait; the trait frames the payload with its tag and
//! length.

pub mod auth;
pub mod copy;
pub mod extended;
pub mod simple;
pub mod startup;

pub use auth::{DefaultPasswordHasher, Password, PasswordChallenge, PasswordHasher, PasswordMethod};
pub use copy::{CopyData, CopyDone, CopyFail};
pub use extended::{Bind, Close, Describe, Execute, Flush, Parse, Sync, Target};
pub use simple::Query;
pub use startup::{CancelRequest, ClientInfo, SslRequest, Startup, Terminate};

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

/// Frontend message type bytes.
pub mod msg_type {
    /// Password response
    pub const PASSWORD: u8 = b'p';
    /// Query (simple query protocol)
    pub const QUERY: u8 = b'Q';
    /// Parse (extended query protocol)
    pub const PARSE: u8 = b'P';
    /// Bind (extended query protocol)
    pub const BIND: u8 = b'B';
    /// Execute (extended query protocol)
    pub const EXECUTE: u8 = b'E';
    /// Describe (extended query protocol)
    pub const DESCRIBE: u8 = b'D';
    /// Close (extended query protocol)
    pub const CLOSE: u8 = b'C';
    /// Sync (extended query protocol)
    pub const SYNC: u8 = b'S';
    /// Flush (extended query protocol)
    pub const FLUSH: u8 = b'H';
    /// CopyData
    pub const COPY_DATA: u8 = b'd';
    /// CopyDone
    pub const COPY_DONE: u8 = b'c';
    /// CopyFail
    pub const COPY_FAIL: u8 = b'f';
    /// Terminate
    pub const TERMINATE: u8 = b'X';
}

mod private {
    pub trait Sealed {}
}

pub(crate) use private::Sealed;

/// A message the client can send.
///
/// Sealed: implemented only by the message types of this module.
pub trait FrontendMessage: private::Sealed {
    /// Type byte, or `None` for Startup, SSLRequest and CancelRequest.
    const TAG: Option<u8>;

    /// Write the payload (everything after the length field).
    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()>;

    /// Append the framed message to `buf`.
    ///
    /// On error `buf` is left exactly as it was.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();
        let result = frame(self, buf);
        if result.is_err() {
            buf.truncate(start);
        }
        result
    }

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(buf)
    }
}

fn frame<M: FrontendMessage + ?Sized>(message: &M, buf: &mut Vec<u8>) -> Result<()> {
    let mut msg = match M::TAG {
        Some(tag) => MessageBuilder::new(buf, tag),
        None => MessageBuilder::new_untagged(buf),
    };
    message.write_payload(&mut msg)?;
    msg.finish()
}
