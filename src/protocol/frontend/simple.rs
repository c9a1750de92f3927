//! Simple query protocol message.

use crate::error::Result;
use crate::protocol::codec::MessageBuilder;

use super::{FrontendMessage, Sealed, msg_type};

/// Query message. May hold several `;`-separated statements.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a>(pub &'a str);

impl Sealed for Query<'_> {}

impl FrontendMessage for Query<'_> {
    const TAG: Option<u8> = Some(msg_type::QUERY);

    fn write_payload(&self, msg: &mut MessageBuilder<'_>) -> Result<()> {
        msg.write_cstr(self.0)
    }
}
