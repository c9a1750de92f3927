//! Buffers shared between a connection and its state machines.

use crate::error::Result;
use crate::protocol::backend::BackendMessage;
use crate::protocol::frontend::FrontendMessage;

/// Read and write buffers for one connection.
pub struct BufferSet {
    /// Payload of the last message read
    pub read_buffer: Vec<u8>,
    /// Outgoing frames
    pub write_buffer: Vec<u8>,
    /// Type byte of the last message read
    pub type_byte: u8,
}

impl BufferSet {
    pub fn new() -> Self {
        Self {
            read_buffer: Vec::with_capacity(8192),
            write_buffer: Vec::with_capacity(8192),
            type_byte: 0,
        }
    }

    /// Parse the last message read.
    pub fn message(&self) -> Result<BackendMessage<'_>> {
        BackendMessage::parse(self.type_byte, &self.read_buffer)
    }

    /// Replace the write buffer with a single message.
    pub fn write_only<M: FrontendMessage>(&mut self, message: &M) -> Result<()> {
        self.write_buffer.clear();
        message.encode(&mut self.write_buffer)
    }

    /// Append a message to the write buffer.
    pub fn write<M: FrontendMessage>(&mut self, message: &M) -> Result<()> {
        message.encode(&mut self.write_buffer)
    }
}

impl Default for BufferSet {
    fn default() -> Self {
        Self::new()
    }
}
