//! Backend (server → client) messages.
//!
//! Every parser is handed exactly the `length - 4` payload bytes of one
//! frame and fails unless it consumes all of them.

pub mod auth;
pub mod copy;
pub mod error;
pub mod extended;
pub mod query;

pub use auth::{
    Authentication, BackendKeyData, NotificationResponse, ParameterStatus, ReadyForQuery,
};
pub use copy::CopyInResponse;
pub use error::{ErrorResponse, NoticeResponse};
pub use extended::ParameterDescription;
pub use query::{CommandComplete, DataRow, FieldDescription, RowDescription};

use crate::error::Result;
use crate::protocol::codec::expect_end;

/// Backend message type bytes.
pub mod msg_type {
    /// Authentication message
    pub const AUTHENTICATION: u8 = b'R';
    /// BackendKeyData
    pub const BACKEND_KEY_DATA: u8 = b'K';
    /// ParameterStatus
    pub const PARAMETER_STATUS: u8 = b'S';
    /// ReadyForQuery
    pub const READY_FOR_QUERY: u8 = b'Z';
    /// RowDescription
    pub const ROW_DESCRIPTION: u8 = b'T';
    /// DataRow
    pub const DATA_ROW: u8 = b'D';
    /// CommandComplete
    pub const COMMAND_COMPLETE: u8 = b'C';
    /// EmptyQueryResponse
    pub const EMPTY_QUERY_RESPONSE: u8 = b'I';
    /// ErrorResponse
    pub const ERROR_RESPONSE: u8 = b'E';
    /// NoticeResponse
    pub const NOTICE_RESPONSE: u8 = b'N';
    /// NotificationResponse
    pub const NOTIFICATION_RESPONSE: u8 = b'A';
    /// ParseComplete
    pub const PARSE_COMPLETE: u8 = b'1';
    /// BindComplete
    pub const BIND_COMPLETE: u8 = b'2';
    /// CloseComplete
    pub const CLOSE_COMPLETE: u8 = b'3';
    /// ParameterDescription
    pub const PARAMETER_DESCRIPTION: u8 = b't';
    /// NoData
    pub const NO_DATA: u8 = b'n';
    /// PortalSuspended
    pub const PORTAL_SUSPENDED: u8 = b's';
    /// CopyInResponse
    pub const COPY_IN_RESPONSE: u8 = b'G';
}

/// A parsed backend message.
///
/// Borrowed variants point into the read buffer the frame was read into.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessage<'a> {
    Authentication(Authentication<'a>),
    BackendKeyData(BackendKeyData),
    ParameterStatus(ParameterStatus<'a>),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription<'a>),
    DataRow(DataRow<'a>),
    CommandComplete(CommandComplete<'a>),
    EmptyQueryResponse,
    ErrorResponse(ErrorResponse),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse<'a>),
    ParameterDescription(ParameterDescription),
    ParseComplete,
    BindComplete,
    CloseComplete,
    NoData,
    PortalSuspended,
    CopyInResponse(CopyInResponse),
    /// A tag this client does not know. The frame was still fully consumed.
    Unknown { tag: u8, payload: &'a [u8] },
}

impl<'a> BackendMessage<'a> {
    /// Decode one frame.
    ///
    /// Unregistered tags become [`BackendMessage::Unknown`]; a registered tag
    /// with a malformed payload is an error.
    pub fn parse(tag: u8, payload: &'a [u8]) -> Result<Self> {
        let message = match tag {
            msg_type::AUTHENTICATION => Self::Authentication(Authentication::parse(payload)?),
            msg_type::BACKEND_KEY_DATA => Self::BackendKeyData(BackendKeyData::parse(payload)?),
            msg_type::PARAMETER_STATUS => Self::ParameterStatus(ParameterStatus::parse(payload)?),
            msg_type::READY_FOR_QUERY => Self::ReadyForQuery(ReadyForQuery::parse(payload)?),
            msg_type::ROW_DESCRIPTION => Self::RowDescription(RowDescription::parse(payload)?),
            msg_type::DATA_ROW => Self::DataRow(DataRow::parse(payload)?),
            msg_type::COMMAND_COMPLETE => Self::CommandComplete(CommandComplete::parse(payload)?),
            msg_type::EMPTY_QUERY_RESPONSE => {
                expect_end(payload, "EmptyQueryResponse")?;
                Self::EmptyQueryResponse
            }
            msg_type::ERROR_RESPONSE => Self::ErrorResponse(ErrorResponse::parse(payload)?),
            msg_type::NOTICE_RESPONSE => Self::NoticeResponse(NoticeResponse::parse(payload)?),
            msg_type::NOTIFICATION_RESPONSE => {
                Self::NotificationResponse(NotificationResponse::parse(payload)?)
            }
            msg_type::PARAMETER_DESCRIPTION => {
                Self::ParameterDescription(ParameterDescription::parse(payload)?)
            }
            msg_type::PARSE_COMPLETE => {
                expect_end(payload, "ParseComplete")?;
                Self::ParseComplete
            }
            msg_type::BIND_COMPLETE => {
                expect_end(payload, "BindComplete")?;
                Self::BindComplete
            }
            msg_type::CLOSE_COMPLETE => {
                expect_end(payload, "CloseComplete")?;
                Self::CloseComplete
            }
            msg_type::NO_DATA => {
                expect_end(payload, "NoData")?;
                Self::NoData
            }
            msg_type::PORTAL_SUSPENDED => {
                expect_end(payload, "PortalSuspended")?;
                Self::PortalSuspended
            }
            msg_type::COPY_IN_RESPONSE => Self::CopyInResponse(CopyInResponse::parse(payload)?),
            _ => Self::Unknown { tag, payload },
        };
        Ok(message)
    }

    /// The tag byte this message arrived with.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Authentication(_) => msg_type::AUTHENTICATION,
            Self::BackendKeyData(_) => msg_type::BACKEND_KEY_DATA,
            Self::ParameterStatus(_) => msg_type::PARAMETER_STATUS,
            Self::ReadyForQuery(_) => msg_type::READY_FOR_QUERY,
            Self::RowDescription(_) => msg_type::ROW_DESCRIPTION,
            Self::DataRow(_) => msg_type::DATA_ROW,
            Self::CommandComplete(_) => msg_type::COMMAND_COMPLETE,
            Self::EmptyQueryResponse => msg_type::EMPTY_QUERY_RESPONSE,
            Self::ErrorResponse(_) => msg_type::ERROR_RESPONSE,
            Self::NoticeResponse(_) => msg_type::NOTICE_RESPONSE,
            Self::NotificationResponse(_) => msg_type::NOTIFICATION_RESPONSE,
            Self::ParameterDescription(_) => msg_type::PARAMETER_DESCRIPTION,
            Self::ParseComplete => msg_type::PARSE_COMPLETE,
            Self::BindComplete => msg_type::BIND_COMPLETE,
            Self::CloseComplete => msg_type::CLOSE_COMPLETE,
            Self::NoData => msg_type::NO_DATA,
            Self::PortalSuspended => msg_type::PORTAL_SUSPENDED,
            Self::CopyInResponse(_) => msg_type::COPY_IN_RESPONSE,
            Self::Unknown { tag, .. } => *tag,
        }
    }

    /// Message name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "Authentication",
            Self::BackendKeyData(_) => "BackendKeyData",
            Self::ParameterStatus(_) => "ParameterStatus",
            Self::ReadyForQuery(_) => "ReadyForQuery",
            Self::RowDescription(_) => "RowDescription",
            Self::DataRow(_) => "DataRow",
            Self::CommandComplete(_) => "CommandComplete",
            Self::EmptyQueryResponse => "EmptyQueryResponse",
            Self::ErrorResponse(_) => "ErrorResponse",
            Self::NoticeResponse(_) => "NoticeResponse",
            Self::NotificationResponse(_) => "NotificationResponse",
            Self::ParameterDescription(_) => "ParameterDescription",
            Self::ParseComplete => "ParseComplete",
            Self::BindComplete => "BindComplete",
            Self::CloseComplete => "CloseComplete",
            Self::NoData => "NoData",
            Self::PortalSuspended => "PortalSuspended",
            Self::CopyInResponse(_) => "CopyInResponse",
            Self::Unknown { .. } => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<(u8, Vec<u8>)> {
        let mut row_description = b"\x00\x01OUTPUT\x00".to_vec();
        row_description.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 0, 0, 6, 0, 8]);
        row_description.extend_from_slice(&[0, 0, 0, 8, 0, 0]);
        vec![
            (b'R', vec![0, 0, 0, 0]),
            (b'K', vec![0, 1, 0xED, 0xD8, 0x02, 0xC4, 0x22, 0x09]),
            (b'S', b"TimeZone\0UTC\0".to_vec()),
            (b'Z', vec![b'I']),
            (b'T', row_description),
            (b'D', b"\x00\x01\x00\x00\x00\x011".to_vec()),
            (b'C', b"SELECT 1\0".to_vec()),
            (b'I', vec![]),
            (b'E', b"SERROR\0Mboom\0\0".to_vec()),
            (b'N', b"SNOTICE\0Mhi\0\0".to_vec()),
            (b'A', b"\x00\x00\x00\x07chan\0data\0".to_vec()),
            (b't', vec![0, 1, 0, 0, 0, 6]),
            (b'1', vec![]),
            (b'2', vec![]),
            (b'3', vec![]),
            (b'n', vec![]),
            (b's', vec![]),
            (b'G', vec![0, 0, 1, 0, 0]),
        ]
    }

    #[test]
    fn test_dispatch_registered_tags() {
        for (tag, payload) in samples() {
            let msg = BackendMessage::parse(tag, &payload).unwrap();
            assert_eq!(msg.tag(), tag, "{}", msg.name());
            assert!(!matches!(msg, BackendMessage::Unknown { .. }));
        }
    }

    #[test]
    fn test_dispatch_rejects_trailing_bytes() {
        for (tag, mut payload) in samples() {
            payload.push(0x7F);
            assert!(
                BackendMessage::parse(tag, &payload).is_err(),
                "tag {} accepted a trailing byte",
                char::from(tag)
            );
        }
    }

    #[test]
    fn test_dispatch_unknown_preserves_bytes() {
        let payload = [0xDE, 0xAD, 0x00, 0xBE, 0xEF];
        let msg = BackendMessage::parse(b'?', &payload).unwrap();
        assert_eq!(
            msg,
            BackendMessage::Unknown {
                tag: b'?',
                payload: &payload
            }
        );
        assert_eq!(msg.tag(), b'?');
    }
}
