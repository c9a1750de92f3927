//! A Vertica client built on sans-I/O protocol state machines.
//!
//! # Features
//!
//! - **Zero-copy parsing**: Message payloads are parsed directly from the read buffer
//! - **Sans-I/O state machines**: Protocol logic is separated from I/O
//! - **One operation at a time**: A shared connection rejects concurrent callers instead of queueing them
//! - **Full session support**: Simple query, prepared statements, COPY FROM STDIN, cancel and interrupt
//!
//! # Example
//!
//! ```no_run
//! use zero_vertica::{Conn, Opts};
//!
//! fn main() -> zero_vertica::Result<()> {
//!     let opts = Opts {
//!         host: "localhost".into(),
//!         user: "dbadmin".into(),
//!         database: Some("docker".into()),
//!         password: Some("secret".into()),
//!         ..Default::default()
//!     };
//!
//!     let conn = Conn::new(opts)?;
//!
//!     let result = conn.query("SELECT 1 AS num")?;
//!     println!("num = {:?}", result.value()?);
//!
//!     conn.close()?;
//!     Ok(())
//! }
//! ```

pub mod buffer_set;
pub mod error;
pub mod opts;
pub mod protocol;
pub mod result;
pub mod row;
pub mod state;
pub mod sync;
pub mod types;

pub use error::{Error, ErrorFields, QueryError, QueryErrorKind, Result};
pub use opts::{Opts, Role, SslMode};
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use result::{ResultSet, RowMode};
pub use row::{Column, ColumnIndex, Row, RowDescription};
pub use state::{Notification, PreparedStatement};
pub use sync::{Conn, CopyWriter, Duplex, Stream};
pub use types::{DataType, TypeRegistry, Value};
