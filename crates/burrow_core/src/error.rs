use serde::Serialize;

/// Unified error type for all driver-layer operations.
/// This enum is serializable so a UI layer can transport it unchanged.
#[derive(Debug, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum BurrowError {
    /// Tunnel, authentication, dial, or ping failure
    #[error("Connection failed: {message}")]
    Connection {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    /// Malformed or rejected SQL
    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    /// Statement failure while applying a batch; the transaction was rolled back
    #[error("Transaction rolled back: {message}")]
    Transaction {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<u16>,
    },

    /// Input validation error (inconsistent staged edit, unsupported provider)
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },

    /// Unexpected internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BurrowError {
    /// Create a connection error from a message
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            hint: None,
        }
    }

    /// Create a connection error with hint
    pub fn connection_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create an execution error from a message
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            code: None,
            hint: None,
        }
    }

    /// Create a validation error from a message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            hint: None,
        }
    }

    /// Create a validation error with hint
    pub fn validation_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Wrap a driver error that surfaced while a batch transaction was open.
    /// The caller must have rolled back before constructing this.
    pub fn transaction(err: mysql_async::Error) -> Self {
        let code = server_code(&err);
        Self::Transaction {
            message: err.to_string(),
            code,
        }
    }
}

/// Convert mysql_async errors, preserving the server error number when present
impl From<mysql_async::Error> for BurrowError {
    fn from(err: mysql_async::Error) -> Self {
        match &err {
            mysql_async::Error::Server(server_err) => BurrowError::Execution {
                message: server_err.message.clone(),
                code: Some(server_err.code),
                hint: generate_mysql_hint(server_err.code),
            },
            // Driver, IO, and URL errors are connection-level failures
            _ => {
                let message = err.to_string();
                let hint = generate_connection_hint(&message);
                BurrowError::Connection {
                    message,
                    hint: Some(hint),
                }
            }
        }
    }
}

impl From<russh::Error> for BurrowError {
    fn from(err: russh::Error) -> Self {
        BurrowError::Connection {
            message: format!("SSH error: {}", err),
            hint: Some("Check the SSH server address and your credentials.".to_string()),
        }
    }
}

impl From<russh_keys::Error> for BurrowError {
    fn from(err: russh_keys::Error) -> Self {
        BurrowError::Connection {
            message: format!("SSH key error: {}", err),
            hint: Some("Verify the private key file is valid and readable.".to_string()),
        }
    }
}

impl From<std::io::Error> for BurrowError {
    fn from(err: std::io::Error) -> Self {
        let hint = match err.kind() {
            std::io::ErrorKind::NotFound => {
                Some("The file or endpoint was not found.".to_string())
            }
            std::io::ErrorKind::PermissionDenied => {
                Some("Permission denied. Check file permissions.".to_string())
            }
            std::io::ErrorKind::ConnectionRefused => {
                Some("Connection refused. Check that the server is running.".to_string())
            }
            _ => None,
        };

        BurrowError::Connection {
            message: err.to_string(),
            hint,
        }
    }
}

fn server_code(err: &mysql_async::Error) -> Option<u16> {
    match err {
        mysql_async::Error::Server(server_err) => Some(server_err.code),
        _ => None,
    }
}

/// Generate an actionable hint for common MySQL server error numbers
fn generate_mysql_hint(code: u16) -> Option<String> {
    match code {
        // Access control
        1044 => Some("Access denied to this database. Check your grants.".to_string()),
        1045 => Some("Access denied. Verify your username and password.".to_string()),
        1142 => Some("Permission denied for this operation on the table.".to_string()),

        // Missing objects
        1049 => Some("Unknown database. Check the database name.".to_string()),
        1146 => Some("Table does not exist. Check the table name and database.".to_string()),
        1054 => Some("Unknown column. Check column names in your statement.".to_string()),

        // Statement problems
        1064 => Some("SQL syntax error. Check your statement syntax.".to_string()),
        1062 => Some("Duplicate key. A row with this key already exists.".to_string()),
        1451 | 1452 => {
            Some("Foreign key constraint violated. Check referencing rows.".to_string())
        }
        1406 => Some("Value too long for the column.".to_string()),
        1366 => Some("Incorrect value for the column type.".to_string()),

        // Server state
        1040 => Some("Too many connections. Try again later.".to_string()),
        1205 => Some("Lock wait timeout. Another transaction holds the lock.".to_string()),
        1213 => Some("Deadlock detected. Retry the batch.".to_string()),

        _ => None,
    }
}

/// Generate an actionable hint for connection errors based on the message
fn generate_connection_hint(message: &str) -> String {
    let lower = message.to_lowercase();

    if lower.contains("connection refused") {
        "Check that the MySQL server is running and accepting connections on the specified host and port.".to_string()
    } else if lower.contains("timeout") || lower.contains("timed out") {
        "The connection timed out. Check network connectivity and firewall settings.".to_string()
    } else if lower.contains("host") && lower.contains("resolve") {
        "Could not resolve hostname. Check the server address.".to_string()
    } else if lower.contains("handshake") || lower.contains("auth") {
        "Authentication failed. Verify your username and password.".to_string()
    } else {
        "Check server address, port, and network connectivity.".to_string()
    }
}

/// Type alias for Result with BurrowError
pub type BurrowResult<T> = Result<T, BurrowError>;
