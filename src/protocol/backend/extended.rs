//! Extended query protocol backend messages.

use crate::error::Result;
use crate::protocol::codec::{expect_end, read_u16, read_u32};
use crate::protocol::types::Oid;

/// ParameterDescription message - types of a prepared statement's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    pub param_types: Vec<Oid>,
}

impl ParameterDescription {
    /// Parse a ParameterDescription message from payload bytes.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let (count, mut data) = read_u16(payload)?;
        let mut param_types = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let (oid, rest) = read_u32(data)?;
            param_types.push(oid);
            data = rest;
        }
        expect_end(data, "ParameterDescription")?;
        Ok(Self { param_types })
    }
}
