//! Authentication and session-level backend messages.

use zerocopy::byteorder::big_endian::U32 as U32BE;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::protocol::codec::{expect_end, read_bytes, read_cstr, read_i32, read_u32};
use crate::protocol::frontend::auth::{PasswordChallenge, PasswordMethod};
use crate::protocol::types::TransactionStatus;

/// Authentication request codes.
pub mod auth_code {
    pub const OK: i32 = 0;
    pub const KERBEROS_V4: i32 = 1;
    pub const KERBEROS_V5: i32 = 2;
    pub const CLEARTEXT_PASSWORD: i32 = 3;
    pub const CRYPT_PASSWORD: i32 = 4;
    pub const MD5_PASSWORD: i32 = 5;
    pub const SCM_CREDENTIAL: i32 = 6;
    pub const GSS: i32 = 7;
    pub const GSS_CONTINUE: i32 = 8;
    pub const CHANGE_PASSWORD: i32 = 9;
    pub const PASSWORD_CHANGED: i32 = 10;
    pub const PASSWORD_GRACE: i32 = 11;
    pub const HASH: i32 = 65536;
    pub const HASH_MD5: i32 = 65536 + 5;
    pub const HASH_SHA512: i32 = 65536 + 512;
}

/// Authentication message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication<'a> {
    /// Authentication successful
    Ok,
    KerberosV4,
    KerberosV5,
    CleartextPassword,
    /// crypt(3) password; the salt is the rest of the payload
    CryptPassword { salt: &'a [u8] },
    Md5Password { salt: [u8; 4] },
    ScmCredential,
    Gss,
    GssContinue { data: &'a [u8] },
    ChangePassword,
    PasswordChanged,
    PasswordGrace,
    HashPassword { salt: [u8; 4], user_salt: &'a [u8] },
    HashMd5Password { salt: [u8; 4] },
    HashSha512Password { salt: [u8; 4], user_salt: &'a [u8] },
}

impl<'a> Authentication<'a> {
    /// Parse an Authentication message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (code, rest) = read_i32(payload)?;

        let auth = match code {
            auth_code::CRYPT_PASSWORD => return Ok(Authentication::CryptPassword { salt: rest }),
            auth_code::GSS_CONTINUE => return Ok(Authentication::GssContinue { data: rest }),
            auth_code::MD5_PASSWORD => {
                let (salt, rest) = read_salt(rest)?;
                expect_end(rest, "Authentication")?;
                return Ok(Authentication::Md5Password { salt });
            }
            auth_code::HASH_MD5 => {
                let (salt, rest) = read_salt(rest)?;
                expect_end(rest, "Authentication")?;
                return Ok(Authentication::HashMd5Password { salt });
            }
            auth_code::HASH | auth_code::HASH_SHA512 => {
                let (salt, rest) = read_salt(rest)?;
                let (user_salt_len, rest) = read_i32(rest)?;
                let user_salt_len = usize::try_from(user_salt_len).map_err(|_e| {
                    Error::Message(format!("negative user salt length: {user_salt_len}"))
                })?;
                let (user_salt, rest) = read_bytes(rest, user_salt_len)?;
                expect_end(rest, "Authentication")?;
                return Ok(if code == auth_code::HASH {
                    Authentication::HashPassword { salt, user_salt }
                } else {
                    Authentication::HashSha512Password { salt, user_salt }
                });
            }
            auth_code::OK => Authentication::Ok,
            auth_code::KERBEROS_V4 => Authentication::KerberosV4,
            auth_code::KERBEROS_V5 => Authentication::KerberosV5,
            auth_code::CLEARTEXT_PASSWORD => Authentication::CleartextPassword,
            auth_code::SCM_CREDENTIAL => Authentication::ScmCredential,
            auth_code::GSS => Authentication::Gss,
            auth_code::CHANGE_PASSWORD => Authentication::ChangePassword,
            auth_code::PASSWORD_CHANGED => Authentication::PasswordChanged,
            auth_code::PASSWORD_GRACE => Authentication::PasswordGrace,
            _ => {
                return Err(Error::Message(format!(
                    "Unknown authentication code: {code}"
                )));
            }
        };
        expect_end(rest, "Authentication")?;
        Ok(auth)
    }

    /// The password challenge this request carries, if it asks for a password.
    pub fn password_challenge(&self) -> Option<PasswordChallenge<'_>> {
        let none: &[u8] = &[];
        let (method, salt, user_salt) = match self {
            Authentication::CleartextPassword => (PasswordMethod::Cleartext, none, none),
            Authentication::CryptPassword { salt } => (PasswordMethod::Crypt, *salt, none),
            Authentication::Md5Password { salt } => (PasswordMethod::Md5, salt.as_slice(), none),
            Authentication::HashMd5Password { salt } => {
                (PasswordMethod::HashMd5, salt.as_slice(), none)
            }
            Authentication::HashPassword { salt, user_salt } => {
                (PasswordMethod::Hash, salt.as_slice(), *user_salt)
            }
            Authentication::HashSha512Password { salt, user_salt } => {
                (PasswordMethod::HashSha512, salt.as_slice(), *user_salt)
            }
            _ => return None,
        };
        Some(PasswordChallenge {
            method,
            salt,
            user_salt,
        })
    }
}

fn read_salt(data: &[u8]) -> Result<([u8; 4], &[u8])> {
    let (salt, rest) = read_bytes(data, 4)?;
    let mut out = [0u8; 4];
    out.copy_from_slice(salt);
    Ok((out, rest))
}

/// BackendKeyData message - process ID and secret key for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
pub struct BackendKeyData {
    pid: U32BE,
    secret_key: U32BE,
}

impl BackendKeyData {
    /// Parse a BackendKeyData message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(*Self::ref_from_bytes(payload)?)
    }

    /// Get the process ID.
    pub fn process_id(&self) -> u32 {
        self.pid.get()
    }

    /// Get the secret key.
    pub fn secret(&self) -> u32 {
        self.secret_key.get()
    }
}

/// ParameterStatus message - server parameter name and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterStatus<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> ParameterStatus<'a> {
    /// Parse a ParameterStatus message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (name, rest) = read_cstr(payload)?;
        let (value, rest) = read_cstr(rest)?;
        expect_end(rest, "ParameterStatus")?;
        Ok(Self { name, value })
    }
}

/// ReadyForQuery message - the server finished a request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyForQuery {
    pub transaction_status: TransactionStatus,
}

impl ReadyForQuery {
    /// Parse a ReadyForQuery message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let [status] = payload else {
            return Err(Error::Message(format!(
                "ReadyForQuery: expected 1 byte, got {}",
                payload.len()
            )));
        };
        let transaction_status = TransactionStatus::from_byte(*status).ok_or_else(|| {
            Error::Message(format!(
                "ReadyForQuery: unknown transaction status {:?}",
                char::from(*status)
            ))
        })?;
        Ok(Self { transaction_status })
    }
}

/// NotificationResponse message - asynchronous notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationResponse<'a> {
    /// PID of the notifying backend
    pub pid: u32,
    pub condition: &'a str,
    pub payload: &'a str,
}

impl<'a> NotificationResponse<'a> {
    /// Parse a NotificationResponse message from payload bytes.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let (pid, rest) = read_u32(payload)?;
        let (condition, rest) = read_cstr(rest)?;
        let (payload_str, rest) = read_cstr(rest)?;
        expect_end(rest, "NotificationResponse")?;
        Ok(Self {
            pid,
            condition,
            payload: payload_str,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_key_data() {
        let key = BackendKeyData::parse(b"\x00\x01\xED\xD8\x02\xC4\"\t").unwrap();
        assert_eq!(key.process_id(), 126424);
        assert_eq!(key.secret(), 46408201);
        assert!(BackendKeyData::parse(&[0, 1, 2]).is_err());
    }

    #[test]
    fn test_md5_challenge() {
        let auth = Authentication::parse(&[0, 0, 0, 5, 1, 2, 3, 4]).unwrap();
        assert_eq!(auth, Authentication::Md5Password { salt: [1, 2, 3, 4] });
        let challenge = auth.password_challenge().unwrap();
        assert_eq!(challenge.method, PasswordMethod::Md5);
        assert_eq!(challenge.salt, &[1, 2, 3, 4]);
    }

    #[test]
    fn test_sha512_challenge() {
        let mut payload = (auth_code::HASH_SHA512).to_be_bytes().to_vec();
        payload.extend_from_slice(&[9, 8, 7, 6]);
        payload.extend_from_slice(&3_i32.to_be_bytes());
        payload.extend_from_slice(b"abc");
        let auth = Authentication::parse(&payload).unwrap();
        assert_eq!(
            auth,
            Authentication::HashSha512Password {
                salt: [9, 8, 7, 6],
                user_salt: b"abc"
            }
        );
        let challenge = auth.password_challenge().unwrap();
        assert_eq!(challenge.method, PasswordMethod::HashSha512);
        assert_eq!(challenge.user_salt, b"abc");
    }

    #[test]
    fn test_crypt_salt_is_rest() {
        let auth = Authentication::parse(&[0, 0, 0, 4, b'a', b'b']).unwrap();
        assert_eq!(auth, Authentication::CryptPassword { salt: b"ab" });
    }

    #[test]
    fn test_unknown_auth_code() {
        assert!(Authentication::parse(&[0, 0, 0, 99]).is_err());
        assert_eq!(
            Authentication::parse(&[0, 0, 0, 0]).unwrap(),
            Authentication::Ok
        );
        assert!(Authentication::Ok.password_challenge().is_none());
    }

    #[test]
    fn test_ready_for_query() {
        let ready = ReadyForQuery::parse(b"T").unwrap();
        assert_eq!(ready.transaction_status, TransactionStatus::InTransaction);
        assert!(ReadyForQuery::parse(b"X").is_err());
        assert!(ReadyForQuery::parse(b"").is_err());
    }
}
