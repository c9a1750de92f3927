//! COPY FROM STDIN messages.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

use super::{FrontendMessage, Sealed, msg_type};

/// CopyData message carrying a chunk of the copy stream.
#[derive(Debug, Clone, Copy)]
pub struct CopyData<'a>(pub &'a [u8]);

impl Sealed for CopyData<'_> {}

impl FrontendMessage for CopyData<'_> {
    const TAG: Option<u8> = Some(msg_type::COPY_DATA);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_bytes(self.0);
        Ok(())
    }
}

/// CopyDone message.
#[derive(Debug, Clone, Copy)]
pub struct CopyDone;

impl Sealed for CopyDone {}

impl FrontendMessage for CopyDone {
    const TAG: Option<u8> = Some(msg_type::COPY_DONE);

    fn write_payload(&self, _msg: &mut MessageBuilder<'_>) -> Result<()> {
        Ok(())
    }
}

/// CopyFail message with the reason the copy was aborted.
#[derive(Debug, Clone, Copy)]
pub struct CopyFail<'a>(pub &'a str);

impl Sealed for CopyFail<'_> {}

impl FrontendMessage for CopyFail<'_> {
    const TAG: Option<u8> = Some(msg_type::COPY_FAIL);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_data() {
        let buf = CopyData(b"foo|bar\n").to_bytes().unwrap();
        assert_eq!(&buf[..5], &[b'd', 0, 0, 0, 12]);
        assert_eq!(&buf[5..], b"foo|bar\n");
    }

    #[test]
    fn test_copy_done() {
        assert_eq!(CopyDone.to_bytes().unwrap(), [b'c', 0, 0, 0, 4]);
    }

    #[test]
    fn test_copy_fail() {
        let buf = CopyFail("sad panda").to_bytes().unwrap();
        assert_eq!(&buf[..5], &[b'f', 0, 0, 0, 14]);
        assert_eq!(&buf[5..], b"sad panda\0");
    }
}
