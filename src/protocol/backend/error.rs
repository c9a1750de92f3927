//! Error and notice response messages.

use crate::error::{Error, ErrorFields, Result};
use crate::protocol::codec::{expect_end, read_cstr, read_u8};

const KNOWN_CODES: &[u8] = b"SCMDHPpqWFLR";

/// Parse `(code, cstring)` fields up to the terminating zero byte.
fn parse_fields(payload: &[u8]) -> Result<ErrorFields> {
    let mut fields = Vec::new();
    let mut data = payload;

    loop {
        let (code, rest) = read_u8(data)?;
        if code == 0 {
            expect_end(rest, "ErrorResponse")?;
            break;
        }
        let (value, rest) = read_cstr(rest)?;
        if !KNOWN_CODES.contains(&code) {
            tracing::debug!(code = %char::from(code), value, "unknown error field");
        }
        fields.push((code, value.to_string()));
        data = rest;
    }

    Ok(ErrorFields::new(fields))
}

/// ErrorResponse message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub fields: ErrorFields,
}

impl ErrorResponse {
    /// Parse an ErrorResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }

    /// Connection-level error raised when the server rejects the handshake.
    pub fn into_connection_error(self) -> Error {
        Error::Connection(self.fields.error_message())
    }
}

/// NoticeResponse message - non-fatal warning/info from server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeResponse {
    pub fields: ErrorFields,
}

impl NoticeResponse {
    /// Parse a NoticeResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            fields: parse_fields(payload)?,
        })
    }
}
