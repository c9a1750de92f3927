//! Wire encoding and decoding primitives.
//!
//! All integers are big-endian. Readers take a slice and return the decoded
//! value together with the unread remainder; writers append to a `Vec<u8>`.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I16, I32, U16, U32};

use crate::error::{Error, Result};

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    match data.split_first() {
        Some((byte, rest)) => Ok((*byte, rest)),
        None => Err(Error::Message("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    let (value, rest) = I16::read_from_prefix(data)
        .map_err(|_e| short("read_i16", data.len(), 2))?;
    Ok((value.get(), rest))
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (value, rest) = U16::read_from_prefix(data)
        .map_err(|_e| short("read_u16", data.len(), 2))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    let (value, rest) = I32::read_from_prefix(data)
        .map_err(|_e| short("read_i32", data.len(), 4))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) = U32::read_from_prefix(data)
        .map_err(|_e| short("read_u32", data.len(), 4))?;
    Ok((value.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    data.split_at_checked(len)
        .ok_or_else(|| short("read_bytes", data.len(), len))
}

/// Read a block prefixed by an int32 length, where `-1` means NULL.
#[inline]
pub fn read_nullable_block(data: &[u8]) -> Result<(Option<&[u8]>, &[u8])> {
    let (len, rest) = read_i32(data)?;
    if len == -1 {
        return Ok((None, rest));
    }
    let len = usize::try_from(len)
        .map_err(|_e| Error::Message(format!("negative block length: {len}")))?;
    let (block, rest) = read_bytes(rest, len)?;
    Ok((Some(block), rest))
}

/// Read null-terminated string bytes, consuming the terminator.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::Message(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| Error::Message(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Fail unless the whole payload was consumed.
#[inline]
pub fn expect_end(rest: &[u8], message: &str) -> Result<()> {
    if rest.is_empty() {
        Ok(())
    } else {
        Err(Error::Message(format!(
            "{message}: {} unread trailing bytes",
            rest.len()
        )))
    }
}

fn short(what: &str, have: usize, need: usize) -> Error {
    Error::Message(format!("{what}: buffer too short: {have} < {need}"))
}

/// Write null-terminated string.
///
/// Fails when `s` contains a NUL byte, which would silently truncate it on
/// the server side.
#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) -> Result<()> {
    if memchr::memchr(0, s).is_some() {
        return Err(Error::InvalidUsage(format!(
            "string contains a NUL byte: {:?}",
            String::from_utf8_lossy(s)
        )));
    }
    out.extend_from_slice(s);
    out.push(0);
    Ok(())
}

/// Message builder helper that handles the length field.
///
/// Frame format:
/// - Type byte (1 byte) - NOT included in length, absent for startup-phase messages
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        Self::new_untagged(buf)
    }

    /// Start building a startup-phase message (no type byte).
    pub fn new_untagged(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write null-terminated string. Fails on an embedded NUL.
    pub fn write_cstr(&mut self, s: &str) -> Result<()> {
        write_cstring(self.buf, s.as_bytes())
    }

    /// Write an int16 count, failing if it does not fit.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let count = i16::try_from(count)
            .map_err(|_e| Error::InvalidUsage(format!("too many items: {count}")))?;
        self.write_i16(count);
        Ok(())
    }

    /// Write an int32 length-prefixed block, or `-1` for NULL.
    pub fn write_nullable_block(&mut self, data: Option<&[u8]>) -> Result<()> {
        match data {
            None => self.write_i32(-1),
            Some(bytes) => {
                let len = i32::try_from(bytes.len()).map_err(|_e| {
                    Error::InvalidUsage(format!("value too large: {} bytes", bytes.len()))
                })?;
                self.write_i32(len);
                self.write_bytes(bytes);
            }
        }
        Ok(())
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) -> Result<()> {
        let len = i32::try_from(self.buf.len() - self.start).map_err(|_e| {
            Error::InvalidUsage(format!(
                "message too large: {} bytes",
                self.buf.len() - self.start
            ))
        })?;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers() {
        let data = [0x00, 0x01, 0xED, 0xD8, 0x02, 0xC4, 0x22, 0x09, 0xFF];
        let (pid, rest) = read_u32(&data).unwrap();
        let (key, rest) = read_i32(rest).unwrap();
        assert_eq!(pid, 126424);
        assert_eq!(key, 46408201);
        assert_eq!(rest, &[0xFF]);
        assert!(read_i16(rest).is_err());
    }

    #[test]
    fn test_read_cstr_consumes_nul() {
        let (s, rest) = read_cstr(b"abc\0def").unwrap();
        assert_eq!(s, "abc");
        assert_eq!(rest, b"def");
        assert!(read_cstr(b"no terminator").is_err());
    }

    #[test]
    fn test_read_nullable_block() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 2, b'h', b'i'];
        let (first, rest) = read_nullable_block(&data).unwrap();
        assert_eq!(first, None);
        let (second, rest) = read_nullable_block(rest).unwrap();
        assert_eq!(second, Some(&b"hi"[..]));
        assert!(rest.is_empty());
        assert!(read_nullable_block(&[0, 0, 0, 5, b'x']).is_err());
    }

    #[test]
    fn test_cstring_rejects_nul() {
        let mut buf = Vec::new();
        assert!(write_cstring(&mut buf, b"ab\0c").is_err());
        assert!(buf.is_empty());
        write_cstring(&mut buf, b"abc").unwrap();
        assert_eq!(buf, b"abc\0");
    }

    #[test]
    fn test_builder_length_excludes_tag() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'Q');
        msg.write_cstr("SELECT 1").unwrap();
        msg.finish().unwrap();
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());
        assert_eq!(&buf[5..], b"SELECT 1\0");
    }

    #[test]
    fn test_expect_end() {
        assert!(expect_end(&[], "Msg").is_ok());
        assert!(expect_end(&[0], "Msg").is_err());
    }
}
