//! Password response and the credential hashing it carries.

use md5::{Digest, Md5};
use sha2::Sha512;

use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;

use super::{FrontendMessage, Sealed, msg_type};

/// How the server wants the password transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordMethod {
    Cleartext,
    Crypt,
    Md5,
    HashMd5,
    Hash,
    HashSha512,
}

/// A password challenge received during authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordChallenge<'a> {
    pub method: PasswordMethod,
    /// Server salt (empty for cleartext)
    pub salt: &'a [u8],
    /// Per-user salt (HASH and HASH_SHA512 only)
    pub user_salt: &'a [u8],
}

/// Computes the credential string sent in a Password message.
pub trait PasswordHasher: std::fmt::Debug + Send + Sync {
    fn password_response(
        &self,
        challenge: &PasswordChallenge<'_>,
        user: &str,
        password: &str,
    ) -> Result<String>;
}

/// Cleartext, crypt(3), MD5 and SHA-512 responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPasswordHasher;

impl PasswordHasher for DefaultPasswordHasher {
    fn password_response(
        &self,
        challenge: &PasswordChallenge<'_>,
        user: &str,
        password: &str,
    ) -> Result<String> {
        match challenge.method {
            PasswordMethod::Cleartext => Ok(password.to_string()),
            PasswordMethod::Md5 | PasswordMethod::HashMd5 => {
                Ok(md5_password(user, password, challenge.salt))
            }
            PasswordMethod::Hash | PasswordMethod::HashSha512 => Ok(sha512_password(
                password,
                challenge.user_salt,
                challenge.salt,
            )),
            PasswordMethod::Crypt => crypt_password(password, challenge.salt),
        }
    }
}

/// Traditional DES crypt(3) of `password` with the two-character `salt`.
pub fn crypt_password(password: &str, salt: &[u8]) -> Result<String> {
    let salt = simdutf8::basic::from_utf8(salt)
        .map_err(|_e| Error::Auth(format!("crypt salt is not text: {salt:?}")))?;
    pwhash::unix_crypt::hash_with(salt, password)
        .map_err(|e| Error::Auth(format!("crypt(3) with salt {salt:?} failed: {e}")))
}

/// `"md5" + md5hex(md5hex(password + user) + salt)`
pub fn md5_password(user: &str, password: &str, salt: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let inner = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}

/// `"sha512" + sha512hex(sha512hex(password + user_salt) + salt)`
pub fn sha512_password(password: &str, user_salt: &[u8], salt: &[u8]) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    hasher.update(user_salt);
    let inner = format!("{:x}", hasher.finalize());

    let mut hasher = Sha512::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("sha512{:x}", hasher.finalize())
}

/// Password message carrying an already computed credential.
#[derive(Debug, Clone, Copy)]
pub struct Password<'a>(pub &'a str);

impl Sealed for Password<'_> {}

impl FrontendMessage for Password<'_> {
    const TAG: Option<u8> = Some(msg_type::PASSWORD);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.0)
    }
}
