//! Error types for zero-vertica.

use thiserror::Error;

use crate::protocol::types::Oid;

/// Result type for zero-vertica operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Field type codes carried by ErrorResponse and NoticeResponse.
pub mod field_type {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub const SEVERITY: u8 = b'S';
    /// SQLSTATE code
    pub const SQLSTATE: u8 = b'C';
    /// Primary message
    pub const MESSAGE: u8 = b'M';
    /// Detail
    pub const DETAIL: u8 = b'D';
    /// Hint
    pub const HINT: u8 = b'H';
    /// Cursor position in the query string (1-based)
    pub const POSITION: u8 = b'P';
    /// Position in the internal query
    pub const INTERNAL_POSITION: u8 = b'p';
    /// Failed internal command text
    pub const INTERNAL_QUERY: u8 = b'q';
    /// Context
    pub const WHERE: u8 = b'W';
    /// Source file name
    pub const FILE: u8 = b'F';
    /// Source line number
    pub const LINE: u8 = b'L';
    /// Source routine name
    pub const ROUTINE: u8 = b'R';
}

/// Rendering order and labels used by [`ErrorFields::error_message`].
const FIELD_LABELS: [(u8, &str); 12] = [
    (field_type::INTERNAL_QUERY, "Internal Query"),
    (field_type::SEVERITY, "Severity"),
    (field_type::MESSAGE, "Message"),
    (field_type::SQLSTATE, "Sqlstate"),
    (field_type::DETAIL, "Detail"),
    (field_type::HINT, "Hint"),
    (field_type::POSITION, "Position"),
    (field_type::WHERE, "Where"),
    (field_type::INTERNAL_POSITION, "Internal Position"),
    (field_type::ROUTINE, "Routine"),
    (field_type::FILE, "File"),
    (field_type::LINE, "Line"),
];

/// Ordered field-code to value list of an ErrorResponse or NoticeResponse.
///
/// Fields are kept in the order the server sent them, including codes this
/// crate has no accessor for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    fields: Vec<(u8, String)>,
}

impl ErrorFields {
    /// Create from an already parsed list of fields.
    pub fn new(fields: Vec<(u8, String)>) -> Self {
        Self { fields }
    }

    /// Look up the value of a field code.
    pub fn get(&self, code: u8) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over `(code, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.fields.iter().map(|(c, v)| (*c, v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no field was sent.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn severity(&self) -> Option<&str> {
        self.get(field_type::SEVERITY)
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.get(field_type::SQLSTATE)
    }

    pub fn message(&self) -> Option<&str> {
        self.get(field_type::MESSAGE)
    }

    pub fn detail(&self) -> Option<&str> {
        self.get(field_type::DETAIL)
    }

    pub fn hint(&self) -> Option<&str> {
        self.get(field_type::HINT)
    }

    pub fn position(&self) -> Option<u32> {
        self.get(field_type::POSITION)?.parse().ok()
    }

    pub fn internal_position(&self) -> Option<u32> {
        self.get(field_type::INTERNAL_POSITION)?.parse().ok()
    }

    pub fn internal_query(&self) -> Option<&str> {
        self.get(field_type::INTERNAL_QUERY)
    }

    pub fn where_(&self) -> Option<&str> {
        self.get(field_type::WHERE)
    }

    pub fn file(&self) -> Option<&str> {
        self.get(field_type::FILE)
    }

    pub fn line(&self) -> Option<u32> {
        self.get(field_type::LINE)?.parse().ok()
    }

    pub fn routine(&self) -> Option<&str> {
        self.get(field_type::ROUTINE)
    }

    /// Render every field as `Label: value`, joined with `, `.
    ///
    /// Known fields come first in a fixed order; unknown codes follow in wire
    /// order, labelled by their code character.
    pub fn error_message(&self) -> String {
        let mut ordered: Vec<(usize, String, &str)> = self
            .fields
            .iter()
            .enumerate()
            .map(|(wire_pos, (code, value))| {
                match FIELD_LABELS.iter().position(|(c, _)| c == code) {
                    Some(rank) => (rank, FIELD_LABELS[rank].1.to_string(), value.as_str()),
                    None => (
                        FIELD_LABELS.len() + wire_pos,
                        char::from(*code).to_string(),
                        value.as_str(),
                    ),
                }
            })
            .collect();
        ordered.sort_by_key(|(rank, _, _)| *rank);
        ordered
            .iter()
            .map(|(_, label, value)| format!("{label}: {value}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error_message())
    }
}

/// Named SQLSTATE conditions callers commonly match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// 55V03
    LockFailure,
    /// 53000
    InsufficientResources,
    /// 53200
    OutOfMemory,
    /// 42601
    SyntaxError,
    /// 42V01
    MissingRelation,
    /// 42703
    MissingColumn,
    /// Any other SQLSTATE
    Other,
}

impl QueryErrorKind {
    /// Classify a SQLSTATE code.
    pub fn from_sqlstate(sqlstate: Option<&str>) -> Self {
        match sqlstate {
            Some("55V03") => QueryErrorKind::LockFailure,
            Some("53000") => QueryErrorKind::InsufficientResources,
            Some("53200") => QueryErrorKind::OutOfMemory,
            Some("42601") => QueryErrorKind::SyntaxError,
            Some("42V01") => QueryErrorKind::MissingRelation,
            Some("42703") => QueryErrorKind::MissingColumn,
            _ => QueryErrorKind::Other,
        }
    }
}

/// Server-reported failure of a query, prepare, execute or copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// Classification by SQLSTATE
    pub kind: QueryErrorKind,
    /// Every field the server sent
    pub fields: ErrorFields,
    /// SQL text that failed
    pub sql: String,
}

impl QueryError {
    /// Build from the fields of an ErrorResponse and the SQL that caused it.
    pub fn new(fields: ErrorFields, sql: impl Into<String>) -> Self {
        Self {
            kind: QueryErrorKind::from_sqlstate(fields.sqlstate()),
            fields,
            sql: sql.into(),
        }
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.fields.sqlstate()
    }

    /// The SQL text with line breaks folded into spaces.
    pub fn one_line_sql(&self) -> String {
        self.sql
            .split(['\r', '\n'])
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, SQL: {:?}",
            self.fields.error_message(),
            self.one_line_sql()
        )
    }
}

impl std::error::Error for QueryError {}

/// Error type for zero-vertica.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or handshake failure. The connection is closed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write did not complete in time. The connection is closed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// SSL was requested but the server refused it
    #[error("SSL requested but not supported by the server")]
    SslNotSupported,

    /// TLS error
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Malformed message payload or frame
    #[error("Malformed message: {0}")]
    Message(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server rejected a query
    #[error("{0}")]
    Query(Box<QueryError>),

    /// Blank or comment-only SQL
    #[error("A SQL string was expected, but the given string was blank or only contained SQL comments.")]
    EmptyQuery,

    /// Another operation is in flight on this connection
    #[error("Cannot run a new operation while busy with {0}")]
    Synchronize(String),

    /// A column or parameter type is not registered
    #[error("Unknown type OID: {0}")]
    UnknownType(Oid),

    /// A name lookup matched more than one column
    #[error("Duplicate column name: {0}")]
    DuplicateColumnName(String),

    /// Row or column lookup out of range
    #[error("Not found: {0}")]
    NotFound(String),

    /// The session id needed by interrupt was never fetched
    #[error("Connection is not interruptable")]
    InterruptImpossible,

    /// The copy source failed and the copy was aborted.
    ///
    /// `server` holds the server's own rejection of the aborted copy, if it
    /// sent one.
    #[error("COPY aborted: {message}")]
    CopyAborted {
        message: String,
        server: Option<Box<QueryError>>,
    },

    /// Column value could not be converted
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid usage (e.g., wrong parameter count)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Returns true if the connection must be closed when this error occurs.
    pub fn is_connection_fatal(&self) -> bool {
        match self {
            Error::Connection(_)
            | Error::Io(_)
            | Error::Timeout(_)
            | Error::SslNotSupported
            | Error::Message(_)
            | Error::Auth(_) => true,
            #[cfg(feature = "tls")]
            Error::Tls(_) => true,
            _ => false,
        }
    }

    /// Get the SQLSTATE code if the server reported one.
    pub fn sqlstate(&self) -> Option<&str> {
        self.query_error().and_then(QueryError::sqlstate)
    }

    /// Get the server error behind this error, if any.
    pub fn query_error(&self) -> Option<&QueryError> {
        match self {
            Error::Query(err) => Some(err),
            Error::CopyAborted {
                server: Some(err), ..
            } => Some(err),
            _ => None,
        }
    }

    /// Get the query error classification.
    pub fn query_error_kind(&self) -> Option<QueryErrorKind> {
        self.query_error().map(|err| err.kind)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(Box::new(err))
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

impl<Src: std::fmt::Debug, Dst: std::fmt::Debug + ?Sized>
    From<zerocopy::error::CastError<Src, Dst>> for Error
{
    fn from(err: zerocopy::error::CastError<Src, Dst>) -> Self {
        Error::Message(format!("zerocopy cast error: {err:?}"))
    }
}
