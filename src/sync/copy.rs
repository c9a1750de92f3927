use std::io;

use crate::error::{Error, Result};
use crate::state::action::write_copy_data;

use super::stream::Stream;

/// Sends the data of a `COPY ... FROM STDIN` to the server.
///
/// Handed to the copy handler of [`Conn::copy`](super::Conn::copy). Every
/// [`send`](Self::send) goes out as one or more CopyData frames.
pub struct CopyWriter<'s> {
    stream: &'s mut Stream,
    buffer: Vec<u8>,
    stream_error: Option<Error>,
    bytes_sent: u64,
}

impl<'s> CopyWriter<'s> {
    pub(crate) fn new(stream: &'s mut Stream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
            stream_error: None,
            bytes_sent: 0,
        }
    }

    /// Send `data` to the server.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if let Some(e) = &self.stream_error {
            return Err(Error::Connection(format!("COPY stream already failed: {e}")));
        }
        self.buffer.clear();
        write_copy_data(&mut self.buffer, data)?;
        if let Err(e) = self.stream.write_all(&self.buffer) {
            let reported = Error::Connection(e.to_string());
            self.stream_error = Some(e);
            return Err(reported);
        }
        self.bytes_sent += data.len() as u64;
        Ok(())
    }

    /// Number of payload bytes sent so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// The transport failure that broke the copy, if any.
    pub(crate) fn take_stream_error(&mut self) -> Option<Error> {
        self.stream_error.take()
    }
}

impl io::Write for CopyWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
