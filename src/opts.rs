//! Connection options.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::protocol::frontend::{DefaultPasswordHasher, PasswordHasher};
use crate::types::TypeRegistry;

/// SSL connection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// Don't use SSL
    #[default]
    Disable,
    /// Require SSL; fail if the server refuses it
    Require,
}

/// Role set after the handshake with `SET ROLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// `SET ROLE ALL`
    All,
    /// `SET ROLE NONE`
    None,
    /// `SET ROLE r1, r2, ...`
    Named(Vec<String>),
}

impl Role {
    fn sql(&self) -> String {
        match self {
            Role::All => "SET ROLE ALL".to_string(),
            Role::None => "SET ROLE NONE".to_string(),
            Role::Named(roles) => format!("SET ROLE {}", roles.join(", ")),
        }
    }
}

/// Connection options for Vertica.
#[derive(Clone)]
pub struct Opts {
    /// Hostname or IP address.
    ///
    /// Default: `"localhost"`
    pub host: String,

    /// Port number of the server.
    ///
    /// Default: `5433`
    pub port: u16,

    /// Username for authentication.
    ///
    /// Default: `""`
    pub user: String,

    /// Password for authentication. A missing password is sent as empty.
    ///
    /// Default: `None`
    pub password: Option<String>,

    /// Database name to use.
    ///
    /// Default: `None`
    pub database: Option<String>,

    /// Value of the `options` startup parameter.
    ///
    /// Default: `None`
    pub options: Option<String>,

    /// SSL connection mode.
    ///
    /// Default: `SslMode::Disable`
    pub ssl_mode: SslMode,

    /// Timeout for establishing the TCP connection.
    ///
    /// Default: `None`
    pub connect_timeout: Option<Duration>,

    /// Timeout for each socket read. Expiry closes the connection.
    ///
    /// Default: `Some(600s)`
    pub read_timeout: Option<Duration>,

    /// Timeout for each socket write. Expiry closes the connection.
    ///
    /// Default: `None`
    pub write_timeout: Option<Duration>,

    /// Fetch the session id after connecting so that `interrupt()` works.
    ///
    /// Default: `false`
    pub interruptable: bool,

    /// Role to set after connecting.
    ///
    /// Default: `None`
    pub role: Option<Role>,

    /// Schemas to set as the search path after connecting.
    ///
    /// Default: `[]`
    pub search_path: Vec<String>,

    /// Session time zone to set after connecting.
    ///
    /// Default: `None`
    pub timezone: Option<String>,

    /// Turn on autocommit after connecting.
    ///
    /// Default: `false`
    pub autocommit: bool,

    /// Reopen a closed connection on the next operation.
    ///
    /// Default: `true`
    pub auto_reconnect: bool,

    /// Send client type, pid, OS, version and label in the startup message.
    ///
    /// Default: `true`
    pub send_client_info: bool,

    /// Types used to convert column values.
    ///
    /// Default: [`TypeRegistry::standard()`]
    pub type_registry: Arc<TypeRegistry>,

    /// Computes password responses during authentication.
    ///
    /// Default: [`DefaultPasswordHasher`]
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5433,
            user: String::new(),
            password: None,
            database: None,
            options: None,
            ssl_mode: SslMode::Disable,
            connect_timeout: None,
            read_timeout: Some(Duration::from_secs(600)),
            write_timeout: None,
            interruptable: false,
            role: None,
            search_path: Vec::new(),
            timezone: None,
            autocommit: false,
            auto_reconnect: true,
            send_client_info: true,
            type_registry: TypeRegistry::standard(),
            password_hasher: Arc::new(DefaultPasswordHasher),
        }
    }
}

impl std::fmt::Debug for Opts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opts")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<hidden>"))
            .field("database", &self.database)
            .field("options", &self.options)
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("interruptable", &self.interruptable)
            .field("role", &self.role)
            .field("search_path", &self.search_path)
            .field("timezone", &self.timezone)
            .field("autocommit", &self.autocommit)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("send_client_info", &self.send_client_info)
            .field("type_registry", &self.type_registry.len())
            .field("password_hasher", &self.password_hasher)
            .finish()
    }
}

/// Query that reads the current session id.
pub(crate) const SESSION_ID_QUERY: &str =
    "SELECT session_id FROM v_monitor.sessions WHERE session_id = (SELECT current_session())";

impl Opts {
    /// Statements run right after the handshake, in order.
    pub(crate) fn session_init_queries(&self) -> Vec<String> {
        let mut queries = Vec::new();
        if !self.search_path.is_empty() {
            queries.push(format!("SET SEARCH_PATH TO {}", self.search_path.join(", ")));
        }
        if let Some(role) = &self.role {
            queries.push(role.sql());
        }
        if let Some(timezone) = &self.timezone {
            queries.push(format!("SET TIME ZONE TO {}", quote_literal(timezone)));
        }
        if self.autocommit {
            queries.push("SET SESSION AUTOCOMMIT TO ON".to_string());
        }
        queries
    }

    /// Options for a short-lived side connection to the same server.
    pub(crate) fn side_connection(&self) -> Self {
        Self {
            interruptable: false,
            role: None,
            search_path: Vec::new(),
            auto_reconnect: false,
            ..self.clone()
        }
    }
}

/// Quote a string as a SQL literal.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, Error> {
    match value {
        "true" | "True" | "1" | "yes" | "on" => Ok(true),
        "false" | "False" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidUsage(format!("Invalid {key}: {value}"))),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, Error> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| Error::InvalidUsage(format!("Invalid {key}: {value}")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl TryFrom<&Url> for Opts {
    type Error = Error;

    /// Parse a Vertica connection URL.
    ///
    /// Format: `vertica://[user[:password]@]host[:port][/database][?param1=value1&..]`
    ///
    /// Supported query parameters:
    /// - `sslmode`: disable, require
    /// - `connect_timeout`, `read_timeout`, `write_timeout`: seconds
    /// - `interruptable`, `autocommit`, `auto_reconnect`, `send_client_info`:
    ///   true/True/1/yes/on or false/False/0/no/off
    /// - `role`: `all`, `none` or a comma-separated list of roles
    /// - `search_path`: comma-separated list of schemas
    /// - `timezone`: session time zone
    /// - `options`: startup `options` string
    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        if url.scheme() != "vertica" {
            return Err(Error::InvalidUsage(format!(
                "Invalid scheme: expected 'vertica://', got '{}://'",
                url.scheme()
            )));
        }

        let mut opts = Opts {
            host: url.host_str().unwrap_or("localhost").to_string(),
            port: url.port().unwrap_or(5433),
            user: url.username().to_string(),
            password: url.password().map(|s| s.to_string()),
            database: url
                .path()
                .strip_prefix('/')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            ..Opts::default()
        };

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "sslmode" => {
                    opts.ssl_mode = match value.as_ref() {
                        "disable" => SslMode::Disable,
                        "require" => SslMode::Require,
                        _ => {
                            return Err(Error::InvalidUsage(format!(
                                "Invalid sslmode: expected one of ['disable', 'require'], got {value}"
                            )));
                        }
                    };
                }
                "connect_timeout" => opts.connect_timeout = Some(parse_seconds(&key, &value)?),
                "read_timeout" => opts.read_timeout = Some(parse_seconds(&key, &value)?),
                "write_timeout" => opts.write_timeout = Some(parse_seconds(&key, &value)?),
                "interruptable" => opts.interruptable = parse_bool(&key, &value)?,
                "autocommit" => opts.autocommit = parse_bool(&key, &value)?,
                "auto_reconnect" => opts.auto_reconnect = parse_bool(&key, &value)?,
                "send_client_info" => opts.send_client_info = parse_bool(&key, &value)?,
                "role" => {
                    opts.role = Some(match value.to_ascii_lowercase().as_str() {
                        "all" => Role::All,
                        "none" => Role::None,
                        _ => Role::Named(split_list(&value)),
                    });
                }
                "search_path" => opts.search_path = split_list(&value),
                "timezone" => opts.timezone = Some(value.to_string()),
                "options" => opts.options = Some(value.to_string()),
                _ => {
                    return Err(Error::InvalidUsage(format!(
                        "Unknown connection parameter: {key}"
                    )));
                }
            }
        }

        Ok(opts)
    }
}

impl TryFrom<&str> for Opts {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let url = Url::parse(s).map_err(|e| Error::InvalidUsage(format!("Invalid URL: {e}")))?;
        Self::try_from(&url)
    }
}
