//! Extended query protocol messages.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::Oid;

use super::{FrontendMessage, Sealed, msg_type};

/// Object addressed by Describe and Close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Prepared statement (`S`)
    Statement,
    /// Portal (`P`)
    Portal,
}

impl Target {
    fn byte(self) -> u8 {
        match self {
            Target::Statement => b'S',
            Target::Portal => b'P',
        }
    }
}

/// Parse message: create a prepared statement.
#[derive(Debug, Clone, Copy)]
pub struct Parse<'a> {
    /// Statement name (empty for the unnamed statement)
    pub name: &'a str,
    pub sql: &'a str,
    /// Parameter type OIDs (0 lets the server infer)
    pub param_types: &'a [Oid],
}

impl Sealed for Parse<'_> {}

impl FrontendMessage for Parse<'_> {
    const TAG: Option<u8> = Some(msg_type::PARSE);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.name)?;
        msg.write_cstr(self.sql)?;
        msg.write_count(self.param_types.len())?;
        for oid in self.param_types {
            msg.write_u32(*oid);
        }
        Ok(())
    }
}

/// Bind message: bind text-encoded parameter values into a portal.
///
/// Layout: portal, statement, one zero (text) format code per value, the
/// parameter type OIDs, the values (`-1` for NULL) and a trailing zero
/// result-format count.
#[derive(Debug, Clone, Copy)]
pub struct Bind<'a> {
    pub portal: &'a str,
    pub statement: &'a str,
    pub param_types: &'a [Oid],
    pub values: &'a [Option<Vec<u8>>],
}

impl Sealed for Bind<'_> {}

impl FrontendMessage for Bind<'_> {
    const TAG: Option<u8> = Some(msg_type::BIND);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.portal)?;
        msg.write_cstr(self.statement)?;

        msg.write_count(self.values.len())?;
        for _ in self.values {
            msg.write_i16(0);
        }

        msg.write_count(self.param_types.len())?;
        for oid in self.param_types {
            msg.write_u32(*oid);
        }

        for value in self.values {
            msg.write_nullable_block(value.as_deref())?;
        }

        msg.write_i16(0);
        Ok(())
    }
}

/// Describe message.
#[derive(Debug, Clone, Copy)]
pub struct Describe<'a> {
    pub target: Target,
    pub name: &'a str,
}

impl Sealed for Describe<'_> {}

impl FrontendMessage for Describe<'_> {
    const TAG: Option<u8> = Some(msg_type::DESCRIBE);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_u8(self.target.byte());
        msg.write_cstr(self.name)
    }
}

/// Execute message.
#[derive(Debug, Clone, Copy)]
pub struct Execute<'a> {
    pub portal: &'a str,
    /// Maximum rows to return (0 = unlimited)
    pub max_rows: u32,
}

impl Sealed for Execute<'_> {}

impl FrontendMessage for Execute<'_> {
    const TAG: Option<u8> = Some(msg_type::EXECUTE);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.portal)?;
        msg.write_u32(self.max_rows);
        Ok(())
    }
}

/// Close message.
#[derive(Debug, Clone, Copy)]
pub struct Close<'a> {
    pub target: Target,
    pub name: &'a str,
}

impl Sealed for Close<'_> {}

impl FrontendMessage for Close<'_> {
    const TAG: Option<u8> = Some(msg_type::CLOSE);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_u8(self.target.byte());
        msg.write_cstr(self.name)
    }
}

/// Sync message: ends an extended-query cycle.
#[derive(Debug, Clone, Copy)]
pub struct Sync;

impl Sealed for Sync {}

impl FrontendMessage for Sync {
    const TAG: Option<u8> = Some(msg_type::SYNC);

    fn write_payload(&self, _msg: &mut MessageBuilder<'_>) -> Result<()> {
        Ok(())
    }
}

/// Flush message: asks the server to send pending output.
#[derive(Debug, Clone, Copy)]
pub struct Flush;

impl Sealed for Flush {}

impl FrontendMessage for Flush {
    const TAG: Option<u8> = Some(msg_type::FLUSH);

    fn write_payload(&self, _msg: &mut MessageBuilder<'_>) -> Result<()> {
        Ok(())
    }
}
