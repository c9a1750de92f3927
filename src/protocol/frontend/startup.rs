//! Startup-phase and termination messages.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

use super::{FrontendMessage, Sealed, msg_type};

/// Protocol version 3.0 (0x00030000)
pub const PROTOCOL_VERSION: i32 = 3 << 16;

/// SSL request code
pub const SSL_REQUEST_CODE: i32 = 80877103;

/// Cancel request code
pub const CANCEL_REQUEST_CODE: i32 = 80877102;

/// Client identification sent with the startup message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub client_type: String,
    pub pid: String,
    pub os: String,
    pub version: String,
    /// `<type>-<version>-<20 hex chars>`
    pub label: String,
}

impl ClientInfo {
    /// Describe this process, with a fresh random label.
    pub fn current() -> Self {
        let client_type = env!("CARGO_PKG_NAME").to_string();
        let version = env!("CARGO_PKG_VERSION").to_string();
        let nonce: [u8; 10] = rand::random();
        let hex: String = nonce.iter().map(|b| format!("{b:02x}")).collect();
        Self {
            label: format!("{client_type}-{version}-{hex}"),
            pid: std::process::id().to_string(),
            os: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
            client_type,
            version,
        }
    }
}

/// StartupMessage.
///
/// Emits `user`, `database`, the client fields and `options`, in that order,
/// skipping the ones that are absent.
#[derive(Debug, Clone)]
pub struct Startup<'a> {
    pub user: Option<&'a str>,
    pub database: Option<&'a str>,
    pub client: Option<&'a ClientInfo>,
    pub options: Option<&'a str>,
}

impl Sealed for Startup<'_> {}

impl FrontendMessage for Startup<'_> {
    const TAG: Option<u8> = None;

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_i32(PROTOCOL_VERSION);

        let mut pair = |name: &str, value: &str| -> Result<()> {
            msg.write_cstr(name)?;
            msg.write_cstr(value)
        };

        if let Some(user) = self.user {
            pair("user", user)?;
        }
        if let Some(database) = self.database {
            pair("database", database)?;
        }
        if let Some(client) = self.client {
            pair("client_type", &client.client_type)?;
            pair("client_pid", &client.pid)?;
            pair("client_os", &client.os)?;
            pair("client_version", &client.version)?;
            pair("client_label", &client.label)?;
        }
        if let Some(options) = self.options {
            pair("options", options)?;
        }

        msg.write_u8(0);
        Ok(())
    }
}

/// SSLRequest. The server answers with a single byte, `S` or `N`.
#[derive(Debug, Clone, Copy)]
pub struct SslRequest;

impl Sealed for SslRequest {}

impl FrontendMessage for SslRequest {
    const TAG: Option<u8> = None;

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_i32(SSL_REQUEST_CODE);
        Ok(())
    }
}

/// CancelRequest, sent on a fresh connection to cancel another session's query.
///
/// The server closes that connection without replying.
#[derive(Debug, Clone, Copy)]
pub struct CancelRequest {
    pub pid: u32,
    pub secret_key: u32,
}

impl Sealed for CancelRequest {}

impl FrontendMessage for CancelRequest {
    const TAG: Option<u8> = None;

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_i32(CANCEL_REQUEST_CODE);
        msg.write_u32(self.pid);
        msg.write_u32(self.secret_key);
        Ok(())
    }
}

/// Terminate.
#[derive(Debug, Clone, Copy)]
pub struct Terminate;

impl Sealed for Terminate {}

impl FrontendMessage for Terminate {
    const TAG: Option<u8> = Some(msg_type::TERMINATE);

    fn write_payload(&self, _msg: &mut MessageBuilder<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_request() {
        let buf = SslRequest.to_bytes().unwrap();
        assert_eq!(buf, [0, 0, 0, 8, 0x04, 0xD2, 0x16, 0x2F]);
    }

    #[test]
    fn test_cancel_request() {
        let buf = CancelRequest {
            pid: 123,
            secret_key: 456,
        }
        .to_bytes()
        .unwrap();

        assert_eq!(&buf[0..4], &16_i32.to_be_bytes());
        assert_eq!(&buf[4..8], &CANCEL_REQUEST_CODE.to_be_bytes());
        assert_eq!(&buf[8..12], &123_u32.to_be_bytes());
        assert_eq!(&buf[12..16], &456_u32.to_be_bytes());
    }

    #[test]
    fn test_startup_field_order() {
        let client = ClientInfo {
            client_type: "t".into(),
            pid: "1".into(),
            os: "o".into(),
            version: "v".into(),
            label: "l".into(),
        };
        let buf = Startup {
            user: Some("dbadmin"),
            database: Some("db"),
            client: Some(&client),
            options: Some("-c x"),
        }
        .to_bytes()
        .unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
        expected.extend_from_slice(
            b"user\0dbadmin\0database\0db\0client_type\0t\0client_pid\01\0\
              client_os\0o\0client_version\0v\0client_label\0l\0options\0-c x\0\0",
        );
        let len = i32::try_from(expected.len() + 4).unwrap();
        assert_eq!(&buf[0..4], &len.to_be_bytes());
        assert_eq!(&buf[4..], &expected[..]);
    }

    #[test]
    fn test_startup_minimal() {
        let buf = Startup {
            user: None,
            database: None,
            client: None,
            options: None,
        }
        .to_bytes()
        .unwrap();
        assert_eq!(buf, [0, 0, 0, 9, 0, 3, 0, 0, 0]);
    }

    #[test]
    fn test_client_label_shape() {
        let info = ClientInfo::current();
        let prefix = format!("{}-{}-", info.client_type, info.version);
        let hex = info.label.strip_prefix(&prefix).unwrap();
        assert_eq!(hex.len(), 20);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_terminate() {
        assert_eq!(Terminate.to_bytes().unwrap(), [b'X', 0, 0, 0, 4]);
    }
}
