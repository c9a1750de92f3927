use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

#[cfg(feature = "tls")]
use native_tls::TlsStream;

use crate::buffer_set::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;

/// A blocking byte stream a connection can run over.
///
/// Implement this to run a connection over something other than TCP.
pub trait Duplex: Read + Write + Send {
    /// Close both directions. The default does nothing.
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Duplex for TcpStream {
    fn shutdown(&mut self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

pub enum Stream {
    Tcp(BufReader<TcpStream>),
    #[cfg(feature = "tls")]
    Tls(BufReader<TlsStream<TcpStream>>),
    Custom(BufReader<Box<dyn Duplex>>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn custom(stream: impl Duplex + 'static) -> Self {
        Self::Custom(BufReader::new(Box::new(stream)))
    }

    /// Open a TCP connection with the timeouts of `opts`.
    pub fn connect(opts: &Opts) -> Result<Self> {
        if opts.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }
        let addrs = (opts.host.as_str(), opts.port)
            .to_socket_addrs()
            .map_err(|e| Error::Connection(format!("{}:{}: {e}", opts.host, opts.port)))?;

        let mut last_error = None;
        for addr in addrs {
            let connected = match opts.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match connected {
                Ok(tcp) => {
                    tcp.set_nodelay(true)?;
                    tcp.set_read_timeout(opts.read_timeout)?;
                    tcp.set_write_timeout(opts.write_timeout)?;
                    tracing::debug!(%addr, "connected");
                    return Ok(Self::tcp(tcp));
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => io_error(e, "connect"),
            None => Error::Connection(format!("{}:{}: no address", opts.host, opts.port)),
        })
    }

    pub fn is_tls(&self) -> bool {
        match self {
            #[cfg(feature = "tls")]
            Stream::Tls(_) => true,
            _ => false,
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = match self {
            Stream::Tcp(r) => r.read_exact(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(r) => r.read_exact(buf),
            Stream::Custom(r) => r.read_exact(buf),
        };
        result.map_err(|e| io_error(e, "read"))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Read one tagged message into the buffer set.
    ///
    /// The declared length is always honored, so an unknown message leaves
    /// the stream positioned at the next frame.
    pub fn read_message(&mut self, buffer_set: &mut BufferSet) -> Result<()> {
        let mut header = [0u8; 5];
        self.read_exact(&mut header)?;
        let [tag, a, b, c, d] = header;
        let length = i32::from_be_bytes([a, b, c, d]);

        let payload_len = length
            .checked_sub(4)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::Message(format!("Invalid message length: {length}")))?;

        buffer_set.type_byte = tag;
        buffer_set.read_buffer.clear();
        buffer_set.read_buffer.resize(payload_len, 0);
        self.read_exact(&mut buffer_set.read_buffer)?;

        tracing::trace!(tag = %char::from(tag), len = payload_len, "backend message");
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let result = match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            #[cfg(feature = "tls")]
            Stream::Tls(r) => r.get_mut().write_all(buf),
            Stream::Custom(r) => r.get_mut().write_all(buf),
        };
        result.map_err(|e| io_error(e, "write"))
    }

    pub fn flush(&mut self) -> Result<()> {
        let result = match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            #[cfg(feature = "tls")]
            Stream::Tls(r) => r.get_mut().flush(),
            Stream::Custom(r) => r.get_mut().flush(),
        };
        result.map_err(|e| io_error(e, "flush"))
    }

    /// Close the underlying transport.
    pub fn shutdown(&mut self) -> Result<()> {
        let result = match self {
            Stream::Tcp(r) => TcpStream::shutdown(r.get_mut(), Shutdown::Both),
            #[cfg(feature = "tls")]
            Stream::Tls(r) => r.get_mut().shutdown(),
            Stream::Custom(r) => r.get_mut().shutdown(),
        };
        result.map_err(Error::Io)
    }

    /// Wrap a TCP stream in TLS after the server accepted SSLRequest.
    #[cfg(feature = "tls")]
    pub fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        let tcp = match self {
            Stream::Tcp(r) => r.into_inner(),
            _ => {
                return Err(Error::Unsupported(
                    "TLS upgrade is only possible on a TCP stream".into(),
                ));
            }
        };
        let connector = native_tls::TlsConnector::new()?;
        let tls = connector
            .connect(host, tcp)
            .map_err(|e| Error::Connection(format!("TLS handshake failed: {e}")))?;
        Ok(Self::Tls(BufReader::new(tls)))
    }

    /// Wrap a TCP stream in TLS after the server accepted SSLRequest.
    #[cfg(not(feature = "tls"))]
    pub fn upgrade_to_tls(self, _host: &str) -> Result<Self> {
        Err(Error::Unsupported(
            "TLS requested but the tls feature is not enabled".into(),
        ))
    }
}

/// Timeouts and short reads leave the stream unusable.
fn io_error(e: io::Error, op: &str) -> Error {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
            Error::Timeout(format!("{op} timed out"))
        }
        io::ErrorKind::UnexpectedEof => {
            Error::Connection(format!("short {op}: the server closed the connection"))
        }
        _ => Error::Io(e),
    }
}
