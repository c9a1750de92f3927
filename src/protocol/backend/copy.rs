//! COPY-related backend messages.

use crate::error::Result;
use crate::protocol::codec::{expect_end, read_i16, read_u16, read_u8};
use crate::protocol::types::FormatCode;

/// CopyInResponse message - the server is ready to receive COPY data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyInResponse {
    /// Overall format (0 = text, 1 = binary)
    pub format: FormatCode,
    /// Per-column format codes
    pub column_formats: Vec<FormatCode>,
}

impl CopyInResponse {
    /// Parse a CopyInResponse message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (format, rest) = read_u8(payload)?;
        let (count, mut data) = read_u16(rest)?;
        let mut column_formats = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let (code, rest) = read_i16(data)?;
            column_formats.push(FormatCode::from_u16(code.unsigned_abs()));
            data = rest;
        }
        expect_end(data, "CopyInResponse")?;
        Ok(Self {
            format: FormatCode::from_u16(u16::from(format)),
            column_formats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_in_response() {
        let msg = CopyInResponse::parse(&[0, 0, 2, 0, 0, 0, 1]).unwrap();
        assert_eq!(msg.format, FormatCode::Text);
        assert_eq!(msg.column_formats, vec![FormatCode::Text, FormatCode::Binary]);
    }
}
