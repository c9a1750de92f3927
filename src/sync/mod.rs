//! Synchronous Vertica client.

mod conn;
mod copy;
mod stream;

pub use conn::Conn;
pub use copy::CopyWriter;
pub use stream::{Duplex, Stream};
